//! Reconciliation passes: scan saved drafts and renew expiring leases.
//!
//! # Responsibility
//! - Decide at startup whether a pass is due and run it.
//! - Renew drafts below the minimum-remaining-days floor.
//! - Persist the reconciliation log after each successful pass.
//!
//! # Invariants
//! - At most one pass runs at a time (`pass_lock`).
//! - The saved collection is written only when a draft was renewed.
//! - The log is written only after the collection step succeeded, so a
//!   failed pass leaves the previous log (and its due time) in place.
//! - An unreadable saved document is quarantined, not retried forever.
//! - Drafts that are not renewed are written back unchanged.

use super::stats_service::StatsService;
use super::update_or_recover;
use super::timer::{ReconciliationTimer, TimerError};
use crate::clock::Clock;
use crate::model::reconciliation::ReconciliationLog;
use crate::model::record::SavedRecord;
use crate::retention::policy::{RetentionPolicy, CHECK_INTERVAL_DAYS, DAY_MS};
use crate::store::{
    Loaded, Mutation, RecordCollection, RecordStore, StoreResult, TypedRecordStore,
    SAVED_RECORDS_KEY,
};
use log::{error, info, warn};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

const MODULE: &str = "reconcile";

/// Scheduler tuning. `Default` is the production cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerOptions {
    pub policy: RetentionPolicy,
    /// Time between passes, in milliseconds.
    pub check_interval_ms: i64,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            policy: RetentionPolicy::default(),
            check_interval_ms: CHECK_INTERVAL_DAYS * DAY_MS,
        }
    }
}

impl SchedulerOptions {
    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(u64::try_from(self.check_interval_ms.max(1)).unwrap_or(1))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    Idle,
    Running,
}

/// Why a pass was started; only used for log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassTrigger {
    Startup,
    Timer,
    Forced,
}

impl PassTrigger {
    fn as_str(self) -> &'static str {
        match self {
            Self::Startup => "startup",
            Self::Timer => "timer",
            Self::Forced => "forced",
        }
    }
}

/// What one successful pass did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PassReport {
    pub log: ReconciliationLog,
    /// Whether the saved collection was rewritten.
    pub collection_written: bool,
    /// Stored entries that could not be read and were left as-is.
    pub malformed_records: u64,
}

/// Result of [`ReconciliationScheduler::initialize`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitializeOutcome {
    Reconciled(PassReport),
    NotDue { next_check_at: i64 },
    /// The pass was due but failed; it stays due for the next attempt.
    Failed(String),
}

/// Diagnostics snapshot for operators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationStatus {
    /// `None` when no pass has completed yet or the log is unreadable.
    pub log: Option<ReconciliationLog>,
    pub due: bool,
    pub state: SchedulerState,
    pub saved_count: usize,
    pub urgent_count: usize,
    pub warning_count: usize,
    pub safe_count: usize,
}

#[derive(Debug, Clone, Copy)]
struct PassTally {
    renewed: u64,
    total: u64,
    malformed: u64,
}

/// Owns the reconciliation pass and the right to arm its timer.
pub struct ReconciliationScheduler<S: RecordStore> {
    store: Arc<S>,
    options: SchedulerOptions,
    pass_lock: Mutex<()>,
    running: AtomicBool,
    timer_armed: AtomicBool,
}

impl<S: RecordStore> ReconciliationScheduler<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self::with_options(store, SchedulerOptions::default())
    }

    pub fn with_options(store: Arc<S>, options: SchedulerOptions) -> Self {
        Self {
            store,
            options,
            pass_lock: Mutex::new(()),
            running: AtomicBool::new(false),
            timer_armed: AtomicBool::new(false),
        }
    }

    pub fn options(&self) -> SchedulerOptions {
        self.options
    }

    pub fn state(&self) -> SchedulerState {
        if self.running.load(Ordering::SeqCst) {
            SchedulerState::Running
        } else {
            SchedulerState::Idle
        }
    }

    /// Runs a pass if one is due at `now_ms`.
    ///
    /// A missing, corrupt, or unreadable log counts as due.
    pub fn initialize(&self, now_ms: i64) -> InitializeOutcome {
        match self.store.load_log() {
            Ok(Loaded::Found(log)) if !log.is_due(now_ms) => {
                info!(
                    "event=reconcile_init module={MODULE} status=skip next_check_at={}",
                    log.next_check_at
                );
                return InitializeOutcome::NotDue {
                    next_check_at: log.next_check_at,
                };
            }
            Ok(Loaded::Found(log)) => info!(
                "event=reconcile_init module={MODULE} status=start reason=due last_check_at={}",
                log.last_check_at
            ),
            Ok(Loaded::NotFound) => {
                info!("event=reconcile_init module={MODULE} status=start reason=no_log")
            }
            Ok(Loaded::Corrupt(message)) => warn!(
                "event=reconcile_init module={MODULE} status=start reason=corrupt_log error={message}"
            ),
            Err(err) => warn!(
                "event=reconcile_init module={MODULE} status=start reason=log_unavailable error_code={} error={err}",
                err.code()
            ),
        }

        match self.run_pass(now_ms, PassTrigger::Startup) {
            Ok(report) => InitializeOutcome::Reconciled(report),
            Err(err) => InitializeOutcome::Failed(err.to_string()),
        }
    }

    /// One reconciliation pass at `now_ms`, regardless of the log's due time.
    pub fn reconcile(&self, now_ms: i64) -> StoreResult<PassReport> {
        self.run_pass(now_ms, PassTrigger::Timer)
    }

    /// Operator escape hatch; same postconditions as [`Self::reconcile`].
    pub fn force_reconcile(&self, now_ms: i64) -> StoreResult<PassReport> {
        self.run_pass(now_ms, PassTrigger::Forced)
    }

    pub fn reconciliation_status(&self, now_ms: i64) -> ReconciliationStatus {
        let log = match self.store.load_log() {
            Ok(Loaded::Found(log)) => Some(log),
            Ok(Loaded::NotFound) => None,
            Ok(Loaded::Corrupt(message)) => {
                warn!(
                    "event=reconcile_status module={MODULE} status=error error_code=malformed_record error={message}"
                );
                None
            }
            Err(err) => {
                warn!(
                    "event=reconcile_status module={MODULE} status=error error_code={} error={err}",
                    err.code()
                );
                None
            }
        };
        let breakdown = StatsService::with_policy(Arc::clone(&self.store), self.options.policy)
            .compute_expiration_breakdown(now_ms);

        ReconciliationStatus {
            due: log.map_or(true, |log| log.is_due(now_ms)),
            log,
            state: self.state(),
            saved_count: breakdown.records.len(),
            urgent_count: breakdown.urgent_count,
            warning_count: breakdown.warning_count,
            safe_count: breakdown.safe_count,
        }
    }

    pub(crate) fn run_pass(&self, now_ms: i64, trigger: PassTrigger) -> StoreResult<PassReport> {
        let _pass = self.begin_pass();
        let started_at = Instant::now();
        let policy = self.options.policy;

        let tally = update_or_recover(
            self.store.as_ref(),
            SAVED_RECORDS_KEY,
            MODULE,
            |collection: &mut RecordCollection<SavedRecord>| {
                let renewed_saved_at = policy.renewed_saved_at(now_ms);
                let mut renewed = 0_u64;
                for record in collection.records_mut() {
                    if policy.needs_renewal(record, now_ms) {
                        record.saved_at = renewed_saved_at;
                        renewed += 1;
                    }
                }
                let tally = PassTally {
                    renewed,
                    total: collection.len() as u64,
                    malformed: collection.malformed_count() as u64,
                };
                if renewed > 0 {
                    Mutation::Write(tally)
                } else {
                    Mutation::Skip(tally)
                }
            },
        )
        .map_err(|err| {
            error!(
                "event=reconcile_pass module={MODULE} status=error trigger={} step=collection duration_ms={} error_code={} error={err}",
                trigger.as_str(),
                started_at.elapsed().as_millis(),
                err.code()
            );
            err
        })?;

        if tally.malformed > 0 {
            warn!(
                "event=reconcile_pass module={MODULE} status=partial trigger={} malformed_records={}",
                trigger.as_str(),
                tally.malformed
            );
        }

        let log = ReconciliationLog::after_pass(
            now_ms,
            self.options.check_interval_ms,
            tally.renewed,
            tally.total,
        );
        self.store.put_log(&log).map_err(|err| {
            error!(
                "event=reconcile_pass module={MODULE} status=error trigger={} step=log duration_ms={} error_code={} error={err}",
                trigger.as_str(),
                started_at.elapsed().as_millis(),
                err.code()
            );
            err
        })?;

        info!(
            "event=reconcile_pass module={MODULE} status=ok trigger={} renewed={} total={} next_check_at={} duration_ms={}",
            trigger.as_str(),
            tally.renewed,
            tally.total,
            log.next_check_at,
            started_at.elapsed().as_millis()
        );
        Ok(PassReport {
            log,
            collection_written: tally.renewed > 0,
            malformed_records: tally.malformed,
        })
    }

    fn begin_pass(&self) -> PassGuard<'_> {
        // The lock guards no data, so a panic in an earlier pass leaves
        // nothing to repair.
        let lock = self.pass_lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.running.store(true, Ordering::SeqCst);
        PassGuard {
            running: &self.running,
            _lock: lock,
        }
    }
}

impl<S: RecordStore + 'static> ReconciliationScheduler<S> {
    /// Runs [`Self::initialize`] and arms the recurring timer.
    ///
    /// Only one timer may be armed per scheduler; stop the returned timer
    /// before starting another.
    pub fn start(
        self: &Arc<Self>,
        clock: Arc<dyn Clock>,
    ) -> Result<ReconciliationTimer, TimerError> {
        if self.timer_armed.swap(true, Ordering::SeqCst) {
            return Err(TimerError::AlreadyStarted);
        }

        if let InitializeOutcome::Failed(message) = self.initialize(clock.now_ms()) {
            warn!(
                "event=reconcile_start module={MODULE} status=degraded reason=initial_pass_failed error={message}"
            );
        }

        let scheduler = Arc::clone(self);
        ReconciliationTimer::spawn(self.options.check_interval(), move || {
            // Errors are already logged by the pass; the next tick retries.
            let _ = scheduler.run_pass(clock.now_ms(), PassTrigger::Timer);
        })
        .map_err(|err| {
            self.timer_armed.store(false, Ordering::SeqCst);
            err
        })
        .map(|timer| timer.on_stop(self.disarm_hook()))
    }

    fn disarm_hook(self: &Arc<Self>) -> Box<dyn FnOnce() + Send> {
        let scheduler = Arc::clone(self);
        Box::new(move || scheduler.timer_armed.store(false, Ordering::SeqCst))
    }
}

struct PassGuard<'a> {
    running: &'a AtomicBool,
    _lock: MutexGuard<'a, ()>,
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }
}
