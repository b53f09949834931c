//! Recurring timer thread that drives reconciliation ticks.
//!
//! # Invariants
//! - The tick closure runs on one dedicated thread, never concurrently with
//!   itself.
//! - `stop` (or drop) wakes the thread immediately and joins it.

use log::{error, info};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::JoinHandle;
use std::time::Duration;

const TIMER_THREAD_NAME: &str = "reconcile-timer";

#[derive(Debug)]
pub enum TimerError {
    /// The scheduler already has an armed timer.
    AlreadyStarted,
    Spawn(std::io::Error),
    /// The timer thread panicked before it could be joined.
    Panicked,
}

impl Display for TimerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AlreadyStarted => write!(f, "reconciliation timer already started"),
            Self::Spawn(err) => write!(f, "failed to spawn reconciliation timer: {err}"),
            Self::Panicked => write!(f, "reconciliation timer thread panicked"),
        }
    }
}

impl Error for TimerError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Spawn(err) => Some(err),
            Self::AlreadyStarted | Self::Panicked => None,
        }
    }
}

/// Handle to a running timer thread.
pub struct ReconciliationTimer {
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
    on_stop: Option<Box<dyn FnOnce() + Send>>,
}

impl ReconciliationTimer {
    /// Spawns a thread calling `tick` every `interval` until stopped.
    pub fn spawn(
        interval: Duration,
        mut tick: impl FnMut() + Send + 'static,
    ) -> Result<Self, TimerError> {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let handle = std::thread::Builder::new()
            .name(TIMER_THREAD_NAME.to_string())
            .spawn(move || loop {
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => tick(),
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })
            .map_err(|err| {
                error!(
                    "event=timer_start module=timer status=error error_code=spawn_failed error={err}"
                );
                TimerError::Spawn(err)
            })?;

        info!(
            "event=timer_start module=timer status=ok interval_ms={}",
            interval.as_millis()
        );
        Ok(Self {
            stop_tx: Some(stop_tx),
            handle: Some(handle),
            on_stop: None,
        })
    }

    /// Registers a callback run once after the thread has been joined.
    pub fn on_stop(mut self, hook: Box<dyn FnOnce() + Send>) -> Self {
        self.on_stop = Some(hook);
        self
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Stops the thread and waits for an in-flight tick to finish.
    pub fn stop(mut self) -> Result<(), TimerError> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<(), TimerError> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        let joined = handle.join().map_err(|_| TimerError::Panicked);
        if let Some(hook) = self.on_stop.take() {
            hook();
        }
        info!(
            "event=timer_stop module=timer status={}",
            if joined.is_ok() { "ok" } else { "error" }
        );
        joined
    }
}

impl Drop for ReconciliationTimer {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}
