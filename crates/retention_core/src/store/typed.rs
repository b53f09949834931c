//! Typed access on top of any [`RecordStore`].
//!
//! # Responsibility
//! - Turn raw documents into record collections and the reconciliation log.
//! - Tell "never written" apart from "written but unreadable".

use super::codec::{is_collection_document, RecordCollection, StoredRecord};
use super::{quarantine_key, RecordStore, StoreError, StoreResult, RECONCILIATION_LOG_KEY};
use crate::model::reconciliation::ReconciliationLog;

/// Result of reading one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Loaded<T> {
    Found(T),
    NotFound,
    /// The key holds a document that cannot be decoded at all.
    Corrupt(String),
}

/// Outcome of an [`TypedRecordStore::update_records`] closure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation<R> {
    /// Persist the modified collection.
    Write(R),
    /// Leave the stored document untouched.
    Skip(R),
}

/// Typed collection and log operations, available on every store.
pub trait TypedRecordStore: RecordStore {
    fn load_records<T: StoredRecord>(&self, key: &str) -> StoreResult<Loaded<RecordCollection<T>>> {
        Ok(match self.get_raw(key)? {
            None => Loaded::NotFound,
            Some(payload) => match RecordCollection::decode(&payload) {
                Ok(collection) => Loaded::Found(collection),
                Err(message) => Loaded::Corrupt(message),
            },
        })
    }

    fn put_records<T: StoredRecord>(
        &self,
        key: &str,
        collection: &RecordCollection<T>,
    ) -> StoreResult<()> {
        let payload = encode(key, collection)?;
        self.put_raw(key, &payload)
    }

    /// Read-modify-write of one collection under the store's write lock.
    ///
    /// A missing key starts from an empty collection. A corrupt document is
    /// never overwritten; the update fails with [`StoreError::Malformed`].
    fn update_records<T, R>(
        &self,
        key: &str,
        apply: impl FnOnce(&mut RecordCollection<T>) -> Mutation<R>,
    ) -> StoreResult<R>
    where
        T: StoredRecord,
    {
        let mut apply = Some(apply);
        let mut outcome = None;
        self.update_raw(key, &mut |current: Option<String>| -> StoreResult<Option<String>> {
            let mut collection: RecordCollection<T> = match current {
                None => RecordCollection::new(),
                Some(payload) => {
                    RecordCollection::decode(&payload).map_err(|message| StoreError::Malformed {
                        key: key.to_string(),
                        message,
                    })?
                }
            };
            let Some(apply) = apply.take() else {
                return Ok(None);
            };
            match apply(&mut collection) {
                Mutation::Write(result) => {
                    let payload = encode(key, &collection)?;
                    outcome = Some(result);
                    Ok(Some(payload))
                }
                Mutation::Skip(result) => {
                    outcome = Some(result);
                    Ok(None)
                }
            }
        })?;
        outcome.ok_or_else(|| StoreError::unavailable(format!("update of `{key}` did not run")))
    }

    /// Moves an unreadable collection document to [`quarantine_key`] and
    /// resets `key` to an empty collection.
    ///
    /// Returns the quarantine key, or `None` when `key` is missing or already
    /// holds a JSON array. The payload is appended to the quarantine before
    /// `key` is touched, and `key` is only reset if it still holds that exact
    /// payload.
    fn quarantine_corrupt(&self, key: &str) -> StoreResult<Option<String>> {
        let Some(payload) = self.get_raw(key)? else {
            return Ok(None);
        };
        if is_collection_document(&payload) {
            return Ok(None);
        }

        let quarantine = quarantine_key(key);
        self.update_raw(&quarantine, &mut |current: Option<String>| -> StoreResult<Option<String>> {
            let existing = current.as_deref().map(serde_json::from_str::<Vec<String>>);
            let mut kept = match existing {
                None => Vec::new(),
                Some(Ok(kept)) => kept,
                // Hand-edited quarantine; keep it as the first element.
                Some(Err(_)) => current.iter().cloned().collect(),
            };
            kept.push(payload.clone());
            serde_json::to_string(&kept)
                .map(Some)
                .map_err(|err| StoreError::Malformed {
                    key: quarantine.clone(),
                    message: err.to_string(),
                })
        })?;

        self.update_raw(key, &mut |current: Option<String>| -> StoreResult<Option<String>> {
            Ok((current.as_deref() == Some(payload.as_str())).then(|| "[]".to_string()))
        })?;
        Ok(Some(quarantine))
    }

    fn load_log(&self) -> StoreResult<Loaded<ReconciliationLog>> {
        Ok(match self.get_raw(RECONCILIATION_LOG_KEY)? {
            None => Loaded::NotFound,
            Some(payload) => match serde_json::from_str(&payload) {
                Ok(log) => Loaded::Found(log),
                Err(err) => Loaded::Corrupt(err.to_string()),
            },
        })
    }

    fn put_log(&self, log: &ReconciliationLog) -> StoreResult<()> {
        let payload = serde_json::to_string(log).map_err(|err| StoreError::Malformed {
            key: RECONCILIATION_LOG_KEY.to_string(),
            message: err.to_string(),
        })?;
        self.put_raw(RECONCILIATION_LOG_KEY, &payload)
    }
}

impl<S: RecordStore + ?Sized> TypedRecordStore for S {}

fn encode<T: StoredRecord>(key: &str, collection: &RecordCollection<T>) -> StoreResult<String> {
    collection.encode().map_err(|err| StoreError::Malformed {
        key: key.to_string(),
        message: err.to_string(),
    })
}
