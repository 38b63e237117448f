//! Transactional handle shared by every service.
//!
//! # Invariants
//! - One connection guarded by one mutex: writes form a single-writer queue.
//! - Write closures run inside `BEGIN IMMEDIATE`, so SQLite holds the
//!   reserved lock for the whole read-check-write sequence.
//! - A closure error rolls the transaction back; nothing partial commits.

use super::{open_db, open_db_in_memory, DbResult};
use log::debug;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Shared SQLite handle with transactional `execute` and plain `read`.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Wraps an already-migrated connection.
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    /// Opens (and migrates) the database file at `path`.
    pub fn open(path: impl AsRef<Path>) -> DbResult<Self> {
        open_db(path).map(Self::new)
    }

    /// Opens (and migrates) a private in-memory database.
    pub fn open_in_memory() -> DbResult<Self> {
        open_db_in_memory().map(Self::new)
    }

    /// Runs `f` inside one IMMEDIATE transaction.
    ///
    /// Commits when `f` returns `Ok`, rolls back and returns the closure error
    /// otherwise.
    pub fn execute<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, E>,
        E: From<rusqlite::Error>,
    {
        let mut conn = self.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        match f(&tx) {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback() {
                    debug!("event=tx_rollback module=db status=error error={rollback_err}");
                }
                Err(err)
            }
        }
    }

    /// Runs `f` against the connection without opening a transaction.
    pub fn read<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Connection) -> Result<T, E>,
    {
        let conn = self.lock();
        f(&conn)
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        // A panic while holding the guard leaves the connection usable: any
        // open transaction was rolled back when it was dropped.
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
