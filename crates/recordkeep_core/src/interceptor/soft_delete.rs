//! Soft-delete policy.
//!
//! # Responsibility
//! - Restrict default reads to live rows.
//! - Rewrite delete-kind changes into deletion-marker updates.
//!
//! # Invariants
//! - A delete-kind change never reaches storage as a physical `DELETE`.
//! - The rewritten change writes the deleted triple and nothing else.

use super::{EntryState, PendingChange, UpdateShape};
use crate::model::record::Record;

/// SQL predicate selecting live rows.
pub const LIVE_ROWS_PREDICATE: &str = "deleted_at IS NULL";

/// Row visibility requested by a read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadScope {
    /// Default: soft-deleted rows are invisible.
    #[default]
    LiveOnly,
    /// Per-call opt-out of the live-only filter.
    IncludingDeleted,
}

impl ReadScope {
    /// Extra predicate to AND into a query, if any.
    pub fn predicate(self) -> Option<&'static str> {
        match self {
            Self::LiveOnly => Some(LIVE_ROWS_PREDICATE),
            Self::IncludingDeleted => None,
        }
    }
}

/// Turns a delete-kind change into a modified-kind change that only sets
/// deletion markers. Other kinds pass through unchanged.
pub fn rewrite_delete<T: Record>(change: PendingChange<T>) -> PendingChange<T> {
    match change.state {
        EntryState::Deleted => PendingChange {
            state: EntryState::Modified,
            shape: UpdateShape::DeletionMarkers,
            record: change.record,
        },
        EntryState::Added | EntryState::Modified => change,
    }
}
