//! Repository error taxonomy.

use crate::db::DbError;
use crate::model::record::{RecordId, RecordValidationError};
use crate::repo::transaction::TransactionState;
use thiserror::Error;

pub type RepoResult<T> = Result<T, RepoError>;

/// Error returned by every repository, interceptor and service operation.
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("{0}")]
    Validation(#[from] RecordValidationError),
    #[error("{0}")]
    Db(#[from] DbError),
    #[error("record not found: {0}")]
    NotFound(RecordId),
    #[error("invalid persisted record data: {0}")]
    InvalidData(String),
    #[error("invalid filter: {0}")]
    InvalidFilter(String),
    /// The caller's version is stale. Re-fetch and retry.
    #[error("record {id} was modified concurrently (expected version {expected}, found {actual})")]
    ConcurrencyConflict {
        id: RecordId,
        expected: i64,
        actual: i64,
    },
    /// An insert collided with an existing primary or unique key.
    #[error("duplicate key in `{table}`: {detail}")]
    DuplicateKey { table: &'static str, detail: String },
    /// An upsert predicate matched several live rows, none of them the
    /// record being saved.
    #[error("upsert predicate matched {matches} live rows in `{table}`")]
    AmbiguousUpsert { table: &'static str, matches: usize },
    #[error("cannot {action} while transaction is {state}")]
    TransactionState {
        action: &'static str,
        state: TransactionState,
    },
    #[error("operation cancelled")]
    Cancelled,
    #[error("storage context lock poisoned")]
    LockPoisoned,
    #[error("blocking task failed: {0}")]
    TaskJoin(String),
}

impl RepoError {
    /// Conflicts and key collisions are recoverable by the caller.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ConcurrencyConflict { .. } | Self::DuplicateKey { .. }
        )
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}
