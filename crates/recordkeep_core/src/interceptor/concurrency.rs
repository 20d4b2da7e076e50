//! Optimistic concurrency guard for update-kind changes.
//!
//! # Invariants
//! - The persisted version is read with its own query, never taken from the
//!   in-memory change.
//! - A mismatch rejects the change before any stamping or write.
//! - An accepted change has its version bumped by exactly one.

use crate::model::record::{Record, RecordId};
use crate::repo::{RepoError, RepoResult};
use rusqlite::{Connection, OptionalExtension};

/// Reads the persisted version of `id`, ignoring the soft-delete filter.
pub(crate) fn persisted_version<T: Record>(
    conn: &Connection,
    id: RecordId,
) -> RepoResult<Option<i64>> {
    let version = conn
        .query_row(
            &format!("SELECT version FROM {} WHERE id = ?1;", T::TABLE),
            [id.to_string()],
            |row| row.get::<_, i64>(0),
        )
        .optional()?;
    Ok(version)
}

/// Compares and bumps record versions at save time.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConcurrencyGuard;

impl ConcurrencyGuard {
    /// Rejects `record` with `ConcurrencyConflict` when its version is stale;
    /// otherwise increments it in place.
    ///
    /// A missing row is not a conflict. The subsequent physical update
    /// decides how to report it.
    pub fn check_and_bump<T: Record>(&self, conn: &Connection, record: &mut T) -> RepoResult<()> {
        let meta = record.meta_mut();
        if let Some(actual) = persisted_version::<T>(conn, meta.id)? {
            if actual != meta.version {
                return Err(RepoError::ConcurrencyConflict {
                    id: meta.id,
                    expected: meta.version,
                    actual,
                });
            }
        }
        meta.version += 1;
        Ok(())
    }
}
