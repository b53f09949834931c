#![allow(dead_code)]

use retention_core::{
    MemoryRecordStore, RecordStore, SavedRecord, StoreError, StoreResult, DAY_MS,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Mutex;

pub const NOW: i64 = 1_760_000_000_000;

pub fn draft_saved_days_ago(id: &str, days: i64) -> SavedRecord {
    SavedRecord {
        id: id.to_string(),
        subject_name: format!("Subject {id}"),
        subject_id: format!("MRN-{id}"),
        saved_at: NOW - days * DAY_MS,
        progress_label: "section 3 of 7".to_string(),
    }
}

/// In-memory store whose reads or writes can be switched off to simulate an
/// unavailable substrate.
#[derive(Default)]
pub struct FlakyStore {
    documents: Mutex<HashMap<String, String>>,
    pub fail_reads: AtomicBool,
    pub fail_writes: AtomicBool,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    fn check_read(&self) -> StoreResult<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("reads disabled".to_string()));
        }
        Ok(())
    }

    fn check_write(&self) -> StoreResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("quota exceeded".to_string()));
        }
        Ok(())
    }
}

impl RecordStore for FlakyStore {
    fn get_raw(&self, key: &str) -> StoreResult<Option<String>> {
        self.check_read()?;
        Ok(self.documents.lock().unwrap().get(key).cloned())
    }

    fn put_raw(&self, key: &str, payload: &str) -> StoreResult<()> {
        self.check_write()?;
        self.documents
            .lock()
            .unwrap()
            .insert(key.to_string(), payload.to_string());
        Ok(())
    }

    fn update_raw(
        &self,
        key: &str,
        apply: &mut dyn FnMut(Option<String>) -> StoreResult<Option<String>>,
    ) -> StoreResult<bool> {
        self.check_read()?;
        let mut documents = self.documents.lock().unwrap();
        let Some(next) = apply(documents.get(key).cloned())? else {
            return Ok(false);
        };
        self.check_write()?;
        documents.insert(key.to_string(), next);
        Ok(true)
    }
}

/// Store whose first `update_raw` parks until released, holding a pass open
/// mid-flight.
pub struct GatedStore {
    inner: MemoryRecordStore,
    armed: AtomicBool,
    entered: Mutex<Sender<()>>,
    release: Mutex<Receiver<()>>,
}

impl GatedStore {
    /// Returns the store, a receiver signalled when the update is parked, and
    /// a sender that lets it continue.
    pub fn new() -> (Self, Receiver<()>, Sender<()>) {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let store = Self {
            inner: MemoryRecordStore::new(),
            armed: AtomicBool::new(true),
            entered: Mutex::new(entered_tx),
            release: Mutex::new(release_rx),
        };
        (store, entered_rx, release_tx)
    }
}

impl RecordStore for GatedStore {
    fn get_raw(&self, key: &str) -> StoreResult<Option<String>> {
        self.inner.get_raw(key)
    }

    fn put_raw(&self, key: &str, payload: &str) -> StoreResult<()> {
        self.inner.put_raw(key, payload)
    }

    fn update_raw(
        &self,
        key: &str,
        apply: &mut dyn FnMut(Option<String>) -> StoreResult<Option<String>>,
    ) -> StoreResult<bool> {
        if self.armed.swap(false, Ordering::SeqCst) {
            self.entered.lock().unwrap().send(()).unwrap();
            self.release.lock().unwrap().recv().unwrap();
        }
        self.inner.update_raw(key, apply)
    }
}
