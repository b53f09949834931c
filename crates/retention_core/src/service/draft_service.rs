//! Draft lifecycle operations used by the screening UI.
//!
//! # Responsibility
//! - Create, list, discard, and complete saved drafts.
//! - Route every saved-collection write through `update_records`, the same
//!   serialized path reconciliation uses, quarantining an unreadable
//!   document instead of failing every save.
//!
//! # Invariants
//! - A new draft's `saved_at` is never ahead of `now`.
//! - Draft ids are unique within the saved collection.
//! - Completing a draft archives it before removing it, so a failure in
//!   between leaves a duplicate rather than a lost record.

use super::{load_or_empty, update_or_recover};
use crate::model::record::{CompletedRecord, RecordValidationError, SavedRecord};
use crate::store::{
    Mutation, RecordCollection, RecordStore, StoreError, COMPLETED_RECORDS_KEY, SAVED_RECORDS_KEY,
};
use log::{info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

const MODULE: &str = "drafts";

pub type DraftResult<T> = Result<T, DraftServiceError>;

#[derive(Debug)]
pub enum DraftServiceError {
    Validation(RecordValidationError),
    /// `saved_at` is later than the supplied `now`.
    SavedInFuture { id: String, saved_at: i64, now_ms: i64 },
    DuplicateId(String),
    NotFound(String),
    Store(StoreError),
}

impl Display for DraftServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::SavedInFuture {
                id,
                saved_at,
                now_ms,
            } => write!(
                f,
                "draft {id} has savedAt {saved_at} after current time {now_ms}"
            ),
            Self::DuplicateId(id) => write!(f, "draft already exists: {id}"),
            Self::NotFound(id) => write!(f, "draft not found: {id}"),
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl Error for DraftServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Store(err) => Some(err),
            Self::SavedInFuture { .. } | Self::DuplicateId(_) | Self::NotFound(_) => None,
        }
    }
}

impl From<RecordValidationError> for DraftServiceError {
    fn from(value: RecordValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<StoreError> for DraftServiceError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

/// Input for a new draft; the id and save time are assigned by the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDraft {
    pub subject_name: String,
    pub subject_id: String,
    pub progress_label: String,
}

pub struct DraftService<S: RecordStore> {
    store: Arc<S>,
}

impl<S: RecordStore> DraftService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Saves a new draft with a generated id at `now_ms`.
    pub fn save_draft(&self, request: NewDraft, now_ms: i64) -> DraftResult<SavedRecord> {
        let record = SavedRecord::new(
            request.subject_name,
            request.subject_id,
            request.progress_label,
            now_ms,
        );
        self.insert_draft(record, now_ms)
    }

    /// Inserts a caller-built draft, e.g. one carried over from another
    /// device with its id and save time intact.
    pub fn insert_draft(&self, record: SavedRecord, now_ms: i64) -> DraftResult<SavedRecord> {
        record.validate()?;
        if record.saved_at > now_ms {
            return Err(DraftServiceError::SavedInFuture {
                id: record.id,
                saved_at: record.saved_at,
                now_ms,
            });
        }

        let inserted = update_or_recover(
            self.store.as_ref(),
            SAVED_RECORDS_KEY,
            MODULE,
            |drafts: &mut RecordCollection<SavedRecord>| {
                if drafts.contains(&record.id) {
                    return Mutation::Skip(Err(DraftServiceError::DuplicateId(record.id.clone())));
                }
                drafts.push(record.clone());
                Mutation::Write(Ok(()))
            },
        )?;
        inserted?;

        info!(
            "event=draft_save module={MODULE} status=ok draft_id={}",
            record.id
        );
        Ok(record)
    }

    pub fn get_draft(&self, id: &str) -> Option<SavedRecord> {
        self.load_drafts().get(id).cloned()
    }

    /// Drafts in stored order; empty when the store cannot be read.
    pub fn list_drafts(&self) -> Vec<SavedRecord> {
        self.load_drafts().into_records()
    }

    /// Removes a draft without archiving it.
    pub fn discard_draft(&self, id: &str) -> DraftResult<SavedRecord> {
        let removed = self.remove_draft(id)?;
        info!("event=draft_discard module={MODULE} status=ok draft_id={id}");
        Ok(removed)
    }

    /// Archives a draft as completed at `now_ms` and removes it from the
    /// saved collection.
    pub fn complete_draft(&self, id: &str, now_ms: i64) -> DraftResult<CompletedRecord> {
        let draft = self
            .get_draft(id)
            .ok_or_else(|| DraftServiceError::NotFound(id.to_string()))?;
        let completed = CompletedRecord::from_draft(draft, now_ms);

        update_or_recover(
            self.store.as_ref(),
            COMPLETED_RECORDS_KEY,
            MODULE,
            |archive: &mut RecordCollection<CompletedRecord>| {
                // Retrying a half-finished completion must not archive twice.
                if archive.contains(&completed.id) {
                    return Mutation::Skip(());
                }
                archive.push(completed.clone());
                Mutation::Write(())
            },
        )?;

        match self.remove_draft(id) {
            Ok(_) => {}
            Err(DraftServiceError::NotFound(_)) => warn!(
                "event=draft_complete module={MODULE} status=partial draft_id={id} reason=removed_concurrently"
            ),
            Err(err) => return Err(err),
        }

        info!("event=draft_complete module={MODULE} status=ok draft_id={id}");
        Ok(completed)
    }

    /// Completed screenings in stored order.
    pub fn list_completed(&self) -> Vec<CompletedRecord> {
        load_or_empty::<_, CompletedRecord>(self.store.as_ref(), COMPLETED_RECORDS_KEY, MODULE)
            .into_records()
    }

    fn remove_draft(&self, id: &str) -> DraftResult<SavedRecord> {
        update_or_recover(
            self.store.as_ref(),
            SAVED_RECORDS_KEY,
            MODULE,
            |drafts: &mut RecordCollection<SavedRecord>| match drafts.remove(id) {
                Some(removed) => Mutation::Write(Some(removed)),
                None => Mutation::Skip(None),
            },
        )?
        .ok_or_else(|| DraftServiceError::NotFound(id.to_string()))
    }

    fn load_drafts(&self) -> RecordCollection<SavedRecord> {
        load_or_empty(self.store.as_ref(), SAVED_RECORDS_KEY, MODULE)
    }
}
