//! Draft and completed screening records.
//!
//! # Invariants
//! - `id` is non-blank and unique within its collection.
//! - `saved_at` is a non-negative epoch timestamp.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Identifier shared by drafts and the completed records they turn into.
pub type RecordId = String;

/// A screening deferred by a user and awaiting completion.
///
/// Serialized in camelCase so stored documents keep the field names used by
/// the host application (`savedAt`, `subjectName`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedRecord {
    pub id: RecordId,
    /// Display-only; never written to logs.
    pub subject_name: String,
    pub subject_id: String,
    /// Unix epoch milliseconds of the last (re)save.
    pub saved_at: i64,
    /// Opaque progress marker owned by the screening form.
    pub progress_label: String,
}

impl SavedRecord {
    /// Creates a draft with a generated id, saved at `now_ms`.
    pub fn new(
        subject_name: impl Into<String>,
        subject_id: impl Into<String>,
        progress_label: impl Into<String>,
        now_ms: i64,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            subject_name: subject_name.into(),
            subject_id: subject_id.into(),
            saved_at: now_ms,
            progress_label: progress_label.into(),
        }
    }

    pub fn validate(&self) -> Result<(), RecordValidationError> {
        validate_id(&self.id)?;
        if self.saved_at < 0 {
            return Err(RecordValidationError::NegativeTimestamp {
                field: "savedAt",
                value: self.saved_at,
            });
        }
        Ok(())
    }
}

/// A finished screening. Write-once; only its count matters to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedRecord {
    pub id: RecordId,
    pub subject_name: String,
    pub subject_id: String,
    pub completed_at: i64,
}

impl CompletedRecord {
    /// Archives `draft` as completed at `now_ms`, keeping its identity.
    pub fn from_draft(draft: SavedRecord, now_ms: i64) -> Self {
        Self {
            id: draft.id,
            subject_name: draft.subject_name,
            subject_id: draft.subject_id,
            completed_at: now_ms,
        }
    }

    pub fn validate(&self) -> Result<(), RecordValidationError> {
        validate_id(&self.id)?;
        if self.completed_at < 0 {
            return Err(RecordValidationError::NegativeTimestamp {
                field: "completedAt",
                value: self.completed_at,
            });
        }
        Ok(())
    }
}

/// Shape violations found on a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordValidationError {
    BlankId,
    NegativeTimestamp { field: &'static str, value: i64 },
}

impl Display for RecordValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankId => write!(f, "record id must not be blank"),
            Self::NegativeTimestamp { field, value } => {
                write!(f, "{field} must be a non-negative epoch timestamp, got {value}")
            }
        }
    }
}

impl Error for RecordValidationError {}

fn validate_id(id: &str) -> Result<(), RecordValidationError> {
    if id.trim().is_empty() {
        return Err(RecordValidationError::BlankId);
    }
    Ok(())
}
