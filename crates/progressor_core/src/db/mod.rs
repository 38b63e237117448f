//! SQLite storage bootstrap, schema migrations and the transactional handle.
//!
//! # Responsibility
//! - Open and configure SQLite connections for Progressor core.
//! - Apply schema migrations in deterministic order.
//! - Serialize every write through one IMMEDIATE transaction at a time.
//!
//! # Invariants
//! - Migration version is tracked via `PRAGMA user_version`.
//! - Core code must not read/write application data before migrations succeed.
//! - At most one card row carries `is_active = 1` (partial unique index).

use thiserror::Error;

pub mod migrations;
mod open;
mod store;

pub use open::{open_db, open_db_in_memory};
pub use store::Store;

pub type DbResult<T> = Result<T, DbError>;

/// Storage-level failure.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("{0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("database schema version {db_version} is newer than supported {latest_supported}")]
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
}
