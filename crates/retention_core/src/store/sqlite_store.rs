//! SQLite-backed record store.
//!
//! # Responsibility
//! - Persist one JSON document per key in the `record_store` table.
//! - Serialize every access through a single connection mutex.
//!
//! # Invariants
//! - Each `put_raw` is a single upsert statement.
//! - `update_raw` reads and writes inside one transaction while holding the
//!   connection mutex; a failing closure rolls back.

use super::{RecordStore, StoreError, StoreResult};
use crate::db::{open_db, open_db_in_memory, DbResult};
use log::{debug, error};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const SELECT_PAYLOAD_SQL: &str = "SELECT payload FROM record_store WHERE store_key = ?1;";
const UPSERT_PAYLOAD_SQL: &str = "INSERT INTO record_store (store_key, payload, updated_at)
     VALUES (?1, ?2, CAST(strftime('%s', 'now') AS INTEGER) * 1000)
     ON CONFLICT(store_key) DO UPDATE SET
        payload = excluded.payload,
        updated_at = excluded.updated_at;";

/// Record store over a migrated SQLite connection.
pub struct SqliteRecordStore {
    conn: Mutex<Connection>,
}

impl SqliteRecordStore {
    /// Wraps an already migrated connection (see [`crate::db`]).
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    pub fn open(path: impl AsRef<Path>) -> DbResult<Self> {
        Ok(Self::new(open_db(path)?))
    }

    pub fn open_in_memory() -> DbResult<Self> {
        Ok(Self::new(open_db_in_memory()?))
    }

    /// Number of times `key` has been written since the database was created.
    pub fn write_count(&self, key: &str) -> StoreResult<u64> {
        let conn = self.lock()?;
        let count = conn
            .query_row(
                "SELECT write_count FROM record_store_writes WHERE store_key = ?1;",
                [key],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        Ok(count.map_or(0, |value| u64::try_from(value).unwrap_or(0)))
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| {
            error!("event=store_lock module=store status=error error_code=lock_poisoned");
            StoreError::Unavailable("record store connection lock poisoned".to_string())
        })
    }
}

impl RecordStore for SqliteRecordStore {
    fn get_raw(&self, key: &str) -> StoreResult<Option<String>> {
        let conn = self.lock()?;
        Ok(read_payload(&conn, key)?)
    }

    fn put_raw(&self, key: &str, payload: &str) -> StoreResult<()> {
        let conn = self.lock()?;
        write_payload(&conn, key, payload)?;
        debug!(
            "event=store_put module=store status=ok key={} bytes={}",
            key,
            payload.len()
        );
        Ok(())
    }

    fn update_raw(
        &self,
        key: &str,
        apply: &mut dyn FnMut(Option<String>) -> StoreResult<Option<String>>,
    ) -> StoreResult<bool> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let current = read_payload(&tx, key)?;
        let Some(next) = apply(current)? else {
            return Ok(false);
        };
        write_payload(&tx, key, &next)?;
        tx.commit()?;

        debug!(
            "event=store_update module=store status=ok key={} bytes={}",
            key,
            next.len()
        );
        Ok(true)
    }
}

fn read_payload(conn: &Connection, key: &str) -> rusqlite::Result<Option<String>> {
    conn.query_row(SELECT_PAYLOAD_SQL, [key], |row| row.get(0))
        .optional()
}

fn write_payload(conn: &Connection, key: &str, payload: &str) -> rusqlite::Result<()> {
    conn.execute(UPSERT_PAYLOAD_SQL, params![key, payload])?;
    Ok(())
}
