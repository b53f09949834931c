//! Process-wide logging for the retention engine.
//!
//! # Responsibility
//! - Start the rotating file logger once per process.
//! - Record panics as single-line events before the default hook runs.
//!
//! # Invariants
//! - Re-initializing with identical settings is a no-op.
//! - Re-initializing with a different level or directory is rejected.
//! - Initialization never panics.
//! - Events carry ids and counts only; subject names stay out of logs.

use flexi_logger::{
    Cleanup, Criterion, FileSpec, LogSpecification, Logger, LoggerHandle, Naming, WriteMode,
};
use log::{error, info, LevelFilter};
use once_cell::sync::OnceCell;
use std::fmt::{Display, Formatter};
use std::panic::PanicHookInfo;
use std::path::PathBuf;
use std::str::FromStr;

const LOG_FILE_BASENAME: &str = "retention";
const MAX_LOG_FILE_SIZE_BYTES: u64 = 5 * 1024 * 1024;
const MAX_LOG_FILES: usize = 3;

static ACTIVE_LOGGER: OnceCell<ActiveLogger> = OnceCell::new();
static PANIC_HOOK: OnceCell<()> = OnceCell::new();

/// Validated logging settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub level: LevelFilter,
    pub log_dir: PathBuf,
}

impl LogSettings {
    /// Parses a level name (`trace|debug|info|warn|error`, any case,
    /// `warning` accepted) and an absolute directory.
    pub fn parse(level: &str, log_dir: &str) -> Result<Self, String> {
        let level_name = level.trim();
        let level = match level_name.to_ascii_lowercase().as_str() {
            "warning" => LevelFilter::Warn,
            "off" => return Err("log level `off` would disable the engine log".to_string()),
            other => LevelFilter::from_str(other).map_err(|_| {
                format!("unsupported log level `{level_name}`; expected trace|debug|info|warn|error")
            })?,
        };

        let log_dir = PathBuf::from(log_dir.trim());
        if log_dir.as_os_str().is_empty() {
            return Err("log_dir cannot be empty".to_string());
        }
        if !log_dir.is_absolute() {
            return Err(format!(
                "log_dir must be an absolute path, got `{}`",
                log_dir.display()
            ));
        }
        Ok(Self { level, log_dir })
    }

    fn spec(&self) -> LogSpecification {
        LogSpecification::builder().default(self.level).build()
    }
}

struct ActiveLogger {
    settings: LogSettings,
    _handle: LoggerHandle,
}

/// Starts file logging, or confirms it is already running with `level` and
/// `log_dir`.
///
/// # Errors
/// - Unknown level, or a blank or relative directory.
/// - Directory creation or logger start-up failure.
/// - A logger is already running with different settings.
pub fn init_logging(level: &str, log_dir: &str) -> Result<(), String> {
    let requested = LogSettings::parse(level, log_dir)?;
    let active = ACTIVE_LOGGER.get_or_try_init(|| start_logger(&requested))?;
    ensure_same_settings(&active.settings, &requested)
}

/// Active `(level, log_dir)`, or `None` before [`init_logging`] succeeded.
pub fn logging_status() -> Option<(LevelFilter, PathBuf)> {
    ACTIVE_LOGGER
        .get()
        .map(|active| (active.settings.level, active.settings.log_dir.clone()))
}

/// `debug` for debug builds, `info` for release builds.
pub fn default_log_level() -> &'static str {
    if cfg!(debug_assertions) {
        "debug"
    } else {
        "info"
    }
}

fn start_logger(settings: &LogSettings) -> Result<ActiveLogger, String> {
    std::fs::create_dir_all(&settings.log_dir).map_err(|err| {
        format!(
            "failed to create log directory `{}`: {err}",
            settings.log_dir.display()
        )
    })?;

    let handle = Logger::with(settings.spec())
        .log_to_file(
            FileSpec::default()
                .directory(settings.log_dir.as_path())
                .basename(LOG_FILE_BASENAME),
        )
        .rotate(
            Criterion::Size(MAX_LOG_FILE_SIZE_BYTES),
            Naming::Numbers,
            Cleanup::KeepLogFiles(MAX_LOG_FILES),
        )
        .write_mode(WriteMode::BufferAndFlush)
        .append()
        .format_for_files(flexi_logger::detailed_format)
        .start()
        .map_err(|err| format!("failed to start logger: {err}"))?;

    install_panic_hook();
    info!(
        "event=engine_start module=core status=ok version={} platform={} level={} log_dir={}",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        settings.level,
        settings.log_dir.display()
    );

    Ok(ActiveLogger {
        settings: settings.clone(),
        _handle: handle,
    })
}

fn ensure_same_settings(active: &LogSettings, requested: &LogSettings) -> Result<(), String> {
    if active.log_dir != requested.log_dir {
        return Err(format!(
            "logging already initialized at `{}`; refusing to switch to `{}`",
            active.log_dir.display(),
            requested.log_dir.display()
        ));
    }
    if active.level != requested.level {
        return Err(format!(
            "logging already initialized with level `{}`; refusing to switch to `{}`",
            active.level, requested.level
        ));
    }
    Ok(())
}

fn install_panic_hook() {
    if PANIC_HOOK.set(()).is_err() {
        return;
    }

    let previous_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        error!("{}", PanicEvent::from_hook(info));
        previous_hook(info);
    }));
}

/// One `panic_captured` log line.
///
/// Payloads may echo user text, so the message is flattened to one line and
/// capped at [`PanicEvent::MAX_MESSAGE_CHARS`].
#[derive(Debug, Clone, PartialEq, Eq)]
struct PanicEvent {
    thread: String,
    location: String,
    message: String,
}

impl PanicEvent {
    const MAX_MESSAGE_CHARS: usize = 160;

    fn from_hook(info: &PanicHookInfo<'_>) -> Self {
        let payload = info.payload();
        let message = payload
            .downcast_ref::<&str>()
            .copied()
            .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
            .unwrap_or("non-string panic payload");
        Self::new(
            std::thread::current().name().unwrap_or("unnamed"),
            info.location()
                .map(|loc| format!("{}:{}", loc.file(), loc.line()))
                .as_deref()
                .unwrap_or("unknown"),
            message,
        )
    }

    fn new(thread: &str, location: &str, message: &str) -> Self {
        let mut flattened: String = message
            .chars()
            .map(|ch| if ch.is_control() { ' ' } else { ch })
            .take(Self::MAX_MESSAGE_CHARS)
            .collect();
        if message.chars().count() > Self::MAX_MESSAGE_CHARS {
            flattened.push_str("...");
        }
        Self {
            thread: thread.to_string(),
            location: location.to_string(),
            message: flattened,
        }
    }
}

impl Display for PanicEvent {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "event=panic_captured module=core status=error thread={} location={} message={}",
            self.thread, self.location, self.message
        )
    }
}
