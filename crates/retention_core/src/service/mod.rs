//! Use-case services over the record store.
//!
//! # Responsibility
//! - Run reconciliation passes and own the recurring timer.
//! - Derive dashboard statistics.
//! - Give UI collaborators a serialized way to add and remove drafts.
//!
//! # Invariants
//! - Services keep no copies of stored state between calls.
//! - Read paths degrade to empty collections and log; they never fail the
//!   caller.
//! - Write paths move an unreadable document aside once and continue from
//!   an empty collection; they never overwrite it.

use crate::store::{
    Loaded, Mutation, RecordCollection, RecordStore, StoreError, StoreResult, StoredRecord,
    TypedRecordStore,
};
use log::{error, warn};

pub mod draft_service;
pub mod reconciliation;
pub mod stats_service;
pub mod timer;

/// Loads a collection for display, falling back to empty on any failure.
pub(crate) fn load_or_empty<S, T>(store: &S, key: &str, module: &str) -> RecordCollection<T>
where
    S: RecordStore + ?Sized,
    T: StoredRecord,
{
    let collection = match store.load_records::<T>(key) {
        Ok(Loaded::Found(collection)) => collection,
        Ok(Loaded::NotFound) => RecordCollection::new(),
        Ok(Loaded::Corrupt(message)) => {
            warn!(
                "event=collection_load module={module} status=error key={key} error_code=malformed_record error={message}"
            );
            RecordCollection::new()
        }
        Err(err) => {
            error!(
                "event=collection_load module={module} status=error key={key} error_code={} error={err}",
                err.code()
            );
            RecordCollection::new()
        }
    };

    let malformed = collection.malformed_count();
    if malformed > 0 {
        warn!(
            "event=collection_load module={module} status=partial key={key} malformed_records={malformed}"
        );
    }
    collection
}

/// [`TypedRecordStore::update_records`] that recovers from an unreadable
/// document by quarantining it and retrying once.
pub(crate) fn update_or_recover<S, T, R, F>(
    store: &S,
    key: &str,
    module: &str,
    apply: F,
) -> StoreResult<R>
where
    S: RecordStore + ?Sized,
    T: StoredRecord,
    F: Fn(&mut RecordCollection<T>) -> Mutation<R>,
{
    match store.update_records(key, &apply) {
        Err(err @ StoreError::Malformed { .. }) => match store.quarantine_corrupt(key)? {
            Some(moved_to) => {
                warn!(
                    "event=collection_quarantine module={module} status=recovered key={key} moved_to={moved_to} error={err}"
                );
                store.update_records(key, &apply)
            }
            None => Err(err),
        },
        result => result,
    }
}
