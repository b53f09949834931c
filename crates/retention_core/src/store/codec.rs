//! JSON encoding of record collections.
//!
//! # Responsibility
//! - Decode a stored JSON array element by element, keeping entries that
//!   fail to decode or validate instead of dropping them.
//! - Re-encode a collection without losing fields or entries the engine does
//!   not understand.
//!
//! # Invariants
//! - Malformed entries are written back verbatim, in their original slot.
//! - A valid entry's unknown fields survive a decode/encode cycle.
//! - Within one collection, the first occurrence of an id wins; later
//!   duplicates are treated as malformed.
//! - Removing an id also drops its shadowed duplicates, so a removed record
//!   never resurfaces on the next decode.

use crate::model::record::{CompletedRecord, RecordValidationError, SavedRecord};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;

/// A record type that can live in a stored collection.
pub trait StoredRecord: Serialize + DeserializeOwned {
    fn record_id(&self) -> &str;
    fn check_shape(&self) -> Result<(), RecordValidationError>;
}

impl StoredRecord for SavedRecord {
    fn record_id(&self) -> &str {
        &self.id
    }

    fn check_shape(&self) -> Result<(), RecordValidationError> {
        self.validate()
    }
}

impl StoredRecord for CompletedRecord {
    fn record_id(&self) -> &str {
        &self.id
    }

    fn check_shape(&self) -> Result<(), RecordValidationError> {
        self.validate()
    }
}

/// A stored entry that could not be read as a record.
#[derive(Debug, Clone, PartialEq)]
pub struct MalformedEntry {
    /// Position in the stored array.
    pub index: usize,
    pub reason: String,
    raw: Value,
    /// Set when the entry is a valid record hidden behind an earlier copy.
    shadowed_id: Option<String>,
}

#[derive(Debug, Clone)]
enum Entry<T> {
    Valid { record: T, raw: Value },
    Malformed(MalformedEntry),
}

/// Ordered collection of records decoded from one store key.
#[derive(Debug, Clone)]
pub struct RecordCollection<T> {
    entries: Vec<Entry<T>>,
}

impl<T> Default for RecordCollection<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<T: StoredRecord> RecordCollection<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: impl IntoIterator<Item = T>) -> Self {
        let mut collection = Self::new();
        for record in records {
            collection.push(record);
        }
        collection
    }

    /// Decodes a stored document.
    ///
    /// Fails only when the document is not a JSON array; bad elements are
    /// kept as [`MalformedEntry`] values.
    pub fn decode(payload: &str) -> Result<Self, String> {
        let document: Value =
            serde_json::from_str(payload).map_err(|err| format!("invalid JSON: {err}"))?;
        let Value::Array(items) = document else {
            return Err("expected a JSON array of records".to_string());
        };

        let mut seen_ids = HashSet::new();
        let entries = items
            .into_iter()
            .enumerate()
            .map(|(index, raw)| decode_entry(index, raw, &mut seen_ids))
            .collect();
        Ok(Self { entries })
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        let mut items = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            items.push(match entry {
                Entry::Valid { record, raw } => merge_into_raw(raw, serde_json::to_value(record)?),
                Entry::Malformed(malformed) => malformed.raw.clone(),
            });
        }
        serde_json::to_string(&items)
    }

    /// Number of valid records (malformed entries excluded).
    pub fn len(&self) -> usize {
        self.records().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn records(&self) -> impl Iterator<Item = &T> {
        self.entries.iter().filter_map(|entry| match entry {
            Entry::Valid { record, .. } => Some(record),
            Entry::Malformed(_) => None,
        })
    }

    pub fn records_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.entries.iter_mut().filter_map(|entry| match entry {
            Entry::Valid { record, .. } => Some(record),
            Entry::Malformed(_) => None,
        })
    }

    pub fn malformed(&self) -> impl Iterator<Item = &MalformedEntry> {
        self.entries.iter().filter_map(|entry| match entry {
            Entry::Malformed(malformed) => Some(malformed),
            Entry::Valid { .. } => None,
        })
    }

    pub fn malformed_count(&self) -> usize {
        self.malformed().count()
    }

    pub fn get(&self, id: &str) -> Option<&T> {
        self.records().find(|record| record.record_id() == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn push(&mut self, record: T) {
        self.entries.push(Entry::Valid {
            record,
            raw: Value::Null,
        });
    }

    /// Removes and returns the valid record with `id`, along with any later
    /// duplicates of it.
    pub fn remove(&mut self, id: &str) -> Option<T> {
        let position = self.entries.iter().position(|entry| {
            matches!(entry, Entry::Valid { record, .. } if record.record_id() == id)
        })?;
        let removed = match self.entries.remove(position) {
            Entry::Valid { record, .. } => record,
            Entry::Malformed(_) => return None,
        };
        self.entries.retain(|entry| match entry {
            Entry::Malformed(malformed) => malformed.shadowed_id.as_deref() != Some(id),
            Entry::Valid { .. } => true,
        });
        Some(removed)
    }

    pub fn into_records(self) -> Vec<T> {
        self.entries
            .into_iter()
            .filter_map(|entry| match entry {
                Entry::Valid { record, .. } => Some(record),
                Entry::Malformed(_) => None,
            })
            .collect()
    }
}

fn decode_entry<T: StoredRecord>(
    index: usize,
    raw: Value,
    seen_ids: &mut HashSet<String>,
) -> Entry<T> {
    let malformed = |reason: String, raw: Value, shadowed_id: Option<String>| {
        Entry::Malformed(MalformedEntry {
            index,
            reason,
            raw,
            shadowed_id,
        })
    };

    let record = match T::deserialize(&raw) {
        Ok(record) => record,
        Err(err) => return malformed(err.to_string(), raw, None),
    };
    if let Err(err) = record.check_shape() {
        return malformed(err.to_string(), raw, None);
    }
    let id = record.record_id().to_string();
    if seen_ids.contains(&id) {
        return malformed(format!("duplicate id `{id}`"), raw, Some(id));
    }
    seen_ids.insert(id);
    Entry::Valid { record, raw }
}

/// True when `payload` is a JSON array, i.e. something
/// [`RecordCollection::decode`] accepts.
pub(crate) fn is_collection_document(payload: &str) -> bool {
    matches!(serde_json::from_str::<Value>(payload), Ok(Value::Array(_)))
}

/// Overlays the serialized record onto the stored object so fields this
/// binary does not model are carried forward.
fn merge_into_raw(raw: &Value, serialized: Value) -> Value {
    match (raw, serialized) {
        (Value::Object(stored), Value::Object(fields)) => {
            let mut merged = stored.clone();
            merged.extend(fields);
            Value::Object(merged)
        }
        (_, serialized) => serialized,
    }
}
