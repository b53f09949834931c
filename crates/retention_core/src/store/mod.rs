//! Key-value record store abstraction.
//!
//! # Responsibility
//! - Define the raw, per-key atomic contract every substrate implements.
//! - Name the logical keys the engine reads and writes.
//!
//! # Invariants
//! - `put_raw` fully replaces the value for a key; no partial writes are
//!   observable.
//! - `update_raw` runs read-modify-write under the store's own write lock,
//!   so concurrent updaters of one key are serialized.
//! - No operation spans more than one key.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod codec;
pub mod memory_store;
pub mod sqlite_store;
pub mod typed;

pub use codec::{MalformedEntry, RecordCollection, StoredRecord};
pub use memory_store::MemoryRecordStore;
pub use sqlite_store::SqliteRecordStore;
pub use typed::{Loaded, Mutation, TypedRecordStore};

/// Draft (in-progress) screenings.
pub const SAVED_RECORDS_KEY: &str = "saved-records";
/// Completed screening archive.
pub const COMPLETED_RECORDS_KEY: &str = "completed-records";
/// Outcome of the last reconciliation pass.
pub const RECONCILIATION_LOG_KEY: &str = "reconciliation-log";

/// Key holding unreadable documents moved aside from `key`, as a JSON array
/// of the raw payload strings, oldest first.
pub fn quarantine_key(key: &str) -> String {
    format!("{key}.corrupt")
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Store-level failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The substrate could not be read or written.
    Unavailable(String),
    /// A stored document does not have the expected shape.
    Malformed { key: String, message: String },
}

impl StoreError {
    pub fn unavailable(err: impl Display) -> Self {
        Self::Unavailable(err.to_string())
    }

    /// Stable code used in log events.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unavailable(_) => "storage_unavailable",
            Self::Malformed { .. } => "malformed_record",
        }
    }
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unavailable(message) => write!(f, "record store unavailable: {message}"),
            Self::Malformed { key, message } => {
                write!(f, "malformed value under `{key}`: {message}")
            }
        }
    }
}

impl Error for StoreError {}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::unavailable(value)
    }
}

/// Durable key-value substrate holding serialized documents.
pub trait RecordStore: Send + Sync {
    /// Returns the stored document for `key`, or `None` if never written.
    fn get_raw(&self, key: &str) -> StoreResult<Option<String>>;

    /// Replaces the document for `key`.
    fn put_raw(&self, key: &str, payload: &str) -> StoreResult<()>;

    /// Reads `key`, hands the current document to `apply`, and writes the
    /// returned document back if `apply` returns `Some`.
    ///
    /// Returns whether a write happened. An error from `apply` aborts the
    /// update without writing.
    fn update_raw(
        &self,
        key: &str,
        apply: &mut dyn FnMut(Option<String>) -> StoreResult<Option<String>>,
    ) -> StoreResult<bool>;
}
