//! Command-line host for the retention engine.
//!
//! # Responsibility
//! - Open the record store, start logging, and run one engine operation.
//! - Print results as JSON so the output can be piped into other tools.
//!
//! # Commands
//!
//! - `status` - reconciliation log, due flag, and live status counts
//! - `reconcile [--force]` - run a pass if due (or unconditionally)
//! - `stats` - dashboard counts plus the per-draft expiration breakdown
//! - `drafts list|add|discard|complete` - manage saved drafts
//! - `run` - start the recurring scheduler until SIGINT or SIGTERM

use clap::{Parser, Subcommand};
use log::{info, warn};
use retention_core::{
    default_log_level, init_logging, Clock, DraftService, InitializeOutcome, NewDraft,
    ReconciliationScheduler, SqliteRecordStore, StatsService, SystemClock,
};
use serde_json::json;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{mpsc, Arc};

/// Saved-screening retention engine.
#[derive(Parser)]
#[command(name = "retention")]
#[command(about = "Inspect and maintain saved screening drafts", long_about = None)]
struct Cli {
    /// Path to the SQLite record store (created if missing)
    #[arg(long, default_value = "retention.db")]
    db: PathBuf,

    /// Absolute directory for rolling log files; logging is off when unset
    #[arg(long)]
    log_dir: Option<String>,

    /// trace|debug|info|warn|error
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the reconciliation log and live status counts.
    Status,

    /// Run a reconciliation pass if one is due.
    Reconcile {
        /// Run even if the next check is not due yet
        #[arg(short, long)]
        force: bool,
    },

    /// Show dashboard counts and per-draft expiration.
    Stats,

    /// Manage saved drafts.
    Drafts {
        #[command(subcommand)]
        action: DraftAction,
    },

    /// Start the scheduler and keep it running until SIGINT or SIGTERM.
    Run,
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Self::Status => "status",
            Self::Reconcile { .. } => "reconcile",
            Self::Stats => "stats",
            Self::Drafts { .. } => "drafts",
            Self::Run => "run",
        }
    }
}

#[derive(Subcommand)]
enum DraftAction {
    /// List saved drafts.
    List,

    /// Save a new draft.
    Add {
        #[arg(long)]
        subject_name: String,
        #[arg(long)]
        subject_id: String,
        #[arg(long, default_value = "started")]
        progress: String,
    },

    /// Remove a draft without archiving it.
    Discard { id: String },

    /// Archive a draft as completed.
    Complete { id: String },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("retention: {message}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), String> {
    if let Some(log_dir) = cli.log_dir.as_deref() {
        let level = cli.log_level.as_deref().unwrap_or_else(|| default_log_level());
        init_logging(level, log_dir)?;
    }

    info!(
        "event=cli_command module=cli status=start command={}",
        cli.command.name()
    );

    let store = Arc::new(SqliteRecordStore::open(&cli.db).map_err(|err| err.to_string())?);
    let clock = SystemClock;
    let scheduler = Arc::new(ReconciliationScheduler::new(Arc::clone(&store)));

    match cli.command {
        Commands::Status => print_json(&scheduler.reconciliation_status(clock.now_ms())),
        Commands::Reconcile { force: true } => {
            let report = scheduler
                .force_reconcile(clock.now_ms())
                .map_err(|err| err.to_string())?;
            print_json(&report)
        }
        Commands::Reconcile { force: false } => match scheduler.initialize(clock.now_ms()) {
            InitializeOutcome::Reconciled(report) => print_json(&report),
            InitializeOutcome::NotDue { next_check_at } => {
                print_json(&json!({ "skipped": true, "nextCheckAt": next_check_at }))
            }
            InitializeOutcome::Failed(message) => Err(message),
        },
        Commands::Stats => {
            let stats = StatsService::new(store);
            print_json(&json!({
                "stats": stats.compute_stats(),
                "expiration": stats.compute_expiration_breakdown(clock.now_ms()),
            }))
        }
        Commands::Drafts { action } => run_drafts(DraftService::new(store), action, &clock),
        Commands::Run => run_until_signal(&scheduler, clock),
    }
}

/// Arms the recurring timer and blocks until SIGINT or SIGTERM.
fn run_until_signal(
    scheduler: &Arc<ReconciliationScheduler<SqliteRecordStore>>,
    clock: SystemClock,
) -> Result<(), String> {
    let (stop_tx, stop_rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        // A closed receiver means shutdown is already under way.
        let _ = stop_tx.send(());
    })
    .map_err(|err| format!("cannot install signal handler: {err}"))?;

    eprintln!("retention: scheduler running; press Ctrl-C or send SIGTERM to stop");
    serve(scheduler, Arc::new(clock), &stop_rx)
}

/// Runs the scheduler until `stop` fires or its sender goes away.
fn serve(
    scheduler: &Arc<ReconciliationScheduler<SqliteRecordStore>>,
    clock: Arc<dyn Clock>,
    stop: &mpsc::Receiver<()>,
) -> Result<(), String> {
    let timer = scheduler.start(clock).map_err(|err| err.to_string())?;

    if let Err(err) = stop.recv() {
        warn!("event=cli_run module=cli status=error reason=stop_channel_closed error={err}");
    }
    info!("event=cli_run module=cli status=stopping reason=signal");
    timer.stop().map_err(|err| err.to_string())
}

fn run_drafts(
    drafts: DraftService<SqliteRecordStore>,
    action: DraftAction,
    clock: &dyn Clock,
) -> Result<(), String> {
    match action {
        DraftAction::List => print_json(&json!({
            "saved": drafts.list_drafts(),
            "completed": drafts.list_completed(),
        })),
        DraftAction::Add {
            subject_name,
            subject_id,
            progress,
        } => {
            let request = NewDraft {
                subject_name,
                subject_id,
                progress_label: progress,
            };
            let saved = drafts
                .save_draft(request, clock.now_ms())
                .map_err(|err| err.to_string())?;
            print_json(&saved)
        }
        DraftAction::Discard { id } => {
            let removed = drafts.discard_draft(&id).map_err(|err| err.to_string())?;
            print_json(&removed)
        }
        DraftAction::Complete { id } => {
            let completed = drafts
                .complete_draft(&id, clock.now_ms())
                .map_err(|err| err.to_string())?;
            print_json(&completed)
        }
    }
}

fn print_json(value: &impl serde::Serialize) -> Result<(), String> {
    let rendered = serde_json::to_string_pretty(value).map_err(|err| err.to_string())?;
    println!("{rendered}");
    Ok(())
}
