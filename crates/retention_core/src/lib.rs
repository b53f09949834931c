//! Retention engine for saved screening drafts.
//!
//! Drafts live in a local key-value store and expire a fixed number of days
//! after they were last saved. A scheduler renews drafts that are about to
//! expire, and a stats service derives dashboard counts from the store.

pub mod clock;
pub mod db;
pub mod logging;
pub mod model;
pub mod retention;
pub mod service;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::reconciliation::ReconciliationLog;
pub use model::record::{CompletedRecord, RecordId, RecordValidationError, SavedRecord};
pub use retention::policy::{
    ExpirationStatus, RetentionPolicy, AUTO_DELETE_THRESHOLD_DAYS, CHECK_INTERVAL_DAYS, DAY_MS,
    EXTENSION_TARGET_DAYS, MIN_DAYS_REMAINING,
};
pub use service::draft_service::{DraftResult, DraftService, DraftServiceError, NewDraft};
pub use service::reconciliation::{
    InitializeOutcome, PassReport, ReconciliationScheduler, ReconciliationStatus,
    SchedulerOptions, SchedulerState,
};
pub use service::stats_service::{
    ExpirationBreakdown, ExpirationDetail, RecordStats, StatsService,
};
pub use service::timer::{ReconciliationTimer, TimerError};
pub use store::{
    quarantine_key, Loaded, MemoryRecordStore, RecordStore, SqliteRecordStore, StoreError,
    StoreResult, TypedRecordStore, COMPLETED_RECORDS_KEY, RECONCILIATION_LOG_KEY,
    SAVED_RECORDS_KEY,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
