//! SQLite storage bootstrap and schema migration entry points.
//!
//! # Responsibility
//! - Open and configure SQLite connections for record storage.
//! - Apply schema migrations in deterministic order.
//!
//! # Invariants
//! - Migration version is tracked via `PRAGMA user_version`.
//! - No record table is read or written before migrations succeed.

use thiserror::Error;

pub mod migrations;
mod open;

pub(crate) use open::open_target;
pub use open::{open_db, open_db_in_memory, DbTarget, DEFAULT_BUSY_TIMEOUT_MS};

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("{0}")]
    Sqlite(#[from] rusqlite::Error),
    /// The file was written by a newer build of the record store.
    #[error("record store schema version {found} is newer than supported version {supported}")]
    SchemaTooNew { found: u32, supported: u32 },
}
