//! Key-value slot contract and implementations.
//!
//! # Responsibility
//! - Provide `get/set/remove` over a named key.
//! - Offer a durable SQLite implementation and a process-local one.
//!
//! # Invariants
//! - `set` replaces any previous value for the key.
//! - `remove` of a missing key succeeds.

use crate::db::{open_db, open_db_in_memory, DbError};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

pub type SlotResult<T> = Result<T, SlotError>;

/// Storage failure while reading or writing a slot.
#[derive(Debug)]
pub enum SlotError {
    Db(DbError),
    /// A previous writer panicked while holding the slot lock.
    Poisoned,
}

impl Display for SlotError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Poisoned => write!(f, "slot storage lock poisoned"),
        }
    }
}

impl Error for SlotError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Poisoned => None,
        }
    }
}

impl From<DbError> for SlotError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for SlotError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl<T> From<PoisonError<T>> for SlotError {
    fn from(_: PoisonError<T>) -> Self {
        Self::Poisoned
    }
}

/// Generic client-local key-value persistence.
pub trait PersistedSlot: Send + Sync {
    fn get(&self, key: &str) -> SlotResult<Option<String>>;
    fn set(&self, key: &str, value: &str) -> SlotResult<()>;
    fn remove(&self, key: &str) -> SlotResult<()>;
}

/// SQLite-backed slots that survive process restarts.
pub struct SqliteSlotStore {
    conn: Mutex<Connection>,
}

impl SqliteSlotStore {
    /// Opens (or creates) the slot database at `path`.
    pub fn open(path: impl AsRef<Path>) -> SlotResult<Self> {
        Ok(Self::from_connection(open_db(path)?))
    }

    /// Opens a throwaway in-memory slot database.
    pub fn in_memory() -> SlotResult<Self> {
        Ok(Self::from_connection(open_db_in_memory()?))
    }

    /// Wraps a connection that already has migrations applied.
    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    fn conn(&self) -> SlotResult<MutexGuard<'_, Connection>> {
        Ok(self.conn.lock()?)
    }
}

impl PersistedSlot for SqliteSlotStore {
    fn get(&self, key: &str) -> SlotResult<Option<String>> {
        let conn = self.conn()?;
        let value = conn
            .query_row(
                "SELECT value FROM persisted_slots WHERE key = ?1;",
                [key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> SlotResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO persisted_slots (key, value, updated_at)
             VALUES (?1, ?2, strftime('%s', 'now') * 1000)
             ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at;",
            params![key, value],
        )?;
        Ok(())
    }

    fn remove(&self, key: &str) -> SlotResult<()> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM persisted_slots WHERE key = ?1;", [key])?;
        Ok(())
    }
}

/// Process-local slots; contents vanish with the process.
#[derive(Default)]
pub struct MemorySlotStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemorySlotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PersistedSlot for MemorySlotStore {
    fn get(&self, key: &str) -> SlotResult<Option<String>> {
        Ok(self.values.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> SlotResult<()> {
        self.values
            .lock()?
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> SlotResult<()> {
        self.values.lock()?.remove(key);
        Ok(())
    }
}
