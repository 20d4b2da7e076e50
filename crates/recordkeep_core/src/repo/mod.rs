//! Repository layer: generic record persistence over SQLite.
//!
//! # Responsibility
//! - Expose uniform CRUD + transaction operations for any `Record` type.
//! - Route every write through the write interceptor.
//! - Keep SQL details inside the persistence boundary.
//!
//! # Invariants
//! - Reads are live-only unless the caller asks for the including-deleted
//!   variant of an operation.
//! - Repository APIs return semantic errors (`NotFound`, `ConcurrencyConflict`,
//!   `DuplicateKey`) in addition to storage errors.

pub mod async_repo;
pub mod context;
pub mod error;
pub mod filter;
pub mod record_repo;
pub(crate) mod sql;
pub mod transaction;

pub use async_repo::AsyncRecordRepository;
pub use context::StoreContext;
pub use error::{RepoError, RepoResult};
pub use filter::{Filter, FilterValue};
pub use record_repo::{RecordRepository, SqliteRecordRepository};
pub use transaction::TransactionState;
