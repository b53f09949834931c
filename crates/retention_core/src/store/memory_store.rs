//! Process-local record store.
//!
//! Same contract as the SQLite store, minus durability. Useful for hosts
//! that persist elsewhere and for tests.

use super::{RecordStore, StoreError, StoreResult};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
struct MemoryState {
    documents: HashMap<String, String>,
    write_counts: HashMap<String, u64>,
}

impl MemoryState {
    fn write(&mut self, key: &str, payload: String) {
        self.documents.insert(key.to_string(), payload);
        *self.write_counts.entry(key.to_string()).or_default() += 1;
    }
}

#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    state: Mutex<MemoryState>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_count(&self, key: &str) -> StoreResult<u64> {
        Ok(self.lock()?.write_counts.get(key).copied().unwrap_or(0))
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))
    }
}

impl RecordStore for MemoryRecordStore {
    fn get_raw(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.lock()?.documents.get(key).cloned())
    }

    fn put_raw(&self, key: &str, payload: &str) -> StoreResult<()> {
        self.lock()?.write(key, payload.to_string());
        Ok(())
    }

    fn update_raw(
        &self,
        key: &str,
        apply: &mut dyn FnMut(Option<String>) -> StoreResult<Option<String>>,
    ) -> StoreResult<bool> {
        let mut state = self.lock()?;
        let current = state.documents.get(key).cloned();
        match apply(current)? {
            Some(next) => {
                state.write(key, next);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
