//! Persistence write-path interceptor.
//!
//! # Responsibility
//! - Run every pending change through audit stamping, optimistic
//!   concurrency checks and the soft-delete rewrite before it reaches SQLite.
//! - Translate key collisions into `RepoError::DuplicateKey`.
//!
//! # Invariants
//! - Changes are applied in registration order.
//! - Concurrency is checked before stamping; a rejected change is never
//!   stamped or written.
//! - The interceptor never opens or commits transactions itself. Callers run
//!   it inside a transaction and roll back on the first error, so a rejected
//!   change leaves storage untouched.

pub mod audit;
pub mod concurrency;
pub mod soft_delete;

use crate::db::DbError;
use crate::model::record::{Record, RecordId, INITIAL_VERSION};
use crate::repo::sql;
use crate::repo::{RepoError, RepoResult};
use audit::{AuditStamper, OperationContext, StampMode};
use concurrency::ConcurrencyGuard;
use log::{debug, warn};
use rusqlite::Connection;
use soft_delete::ReadScope;

/// Caller intent for one pending change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    Added,
    Modified,
    Deleted,
}

impl EntryState {
    fn as_str(self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Modified => "modified",
            Self::Deleted => "deleted",
        }
    }
}

/// Which columns a modified-kind change writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateShape {
    /// Payload, updated stamp and version.
    Payload,
    /// `Payload` plus clearing the deletion stamp.
    Revival,
    /// Deletion stamp only.
    DeletionMarkers,
}

/// In-memory, not yet flushed mutation of one record.
#[derive(Debug, Clone)]
pub struct PendingChange<T> {
    pub state: EntryState,
    pub shape: UpdateShape,
    pub record: T,
}

impl<T: Record> PendingChange<T> {
    pub fn added(record: T) -> Self {
        Self {
            state: EntryState::Added,
            shape: UpdateShape::Payload,
            record,
        }
    }

    pub fn modified(record: T) -> Self {
        Self {
            state: EntryState::Modified,
            shape: UpdateShape::Payload,
            record,
        }
    }

    /// Modified change that also clears the deletion stamp.
    pub fn revived(record: T) -> Self {
        Self {
            state: EntryState::Modified,
            shape: UpdateShape::Revival,
            record,
        }
    }

    pub fn deleted(record: T) -> Self {
        Self {
            state: EntryState::Deleted,
            shape: UpdateShape::Payload,
            record,
        }
    }
}

/// Ordered queue of pending changes for one save.
#[derive(Debug, Clone)]
pub struct ChangeTracker<T> {
    entries: Vec<PendingChange<T>>,
}

impl<T: Record> ChangeTracker<T> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn register(&mut self, change: PendingChange<T>) {
        self.entries.push(change);
    }

    pub fn register_all(&mut self, records: impl IntoIterator<Item = T>, make: fn(T) -> PendingChange<T>) {
        self.entries.extend(records.into_iter().map(make));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn drain(&mut self) -> std::vec::Drain<'_, PendingChange<T>> {
        self.entries.drain(..)
    }
}

impl<T: Record> Default for ChangeTracker<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Applies pending changes for one save under a fixed operation context.
pub struct WriteInterceptor {
    stamper: AuditStamper,
    guard: ConcurrencyGuard,
    context: OperationContext,
}

impl WriteInterceptor {
    pub fn new(stamper: AuditStamper, context: OperationContext) -> Self {
        Self {
            stamper,
            guard: ConcurrencyGuard,
            context,
        }
    }

    /// Flushes every tracked change in order and returns the committed
    /// records. Stops at the first rejection; the tracker is emptied either
    /// way.
    pub fn save_changes<T: Record>(
        &self,
        conn: &Connection,
        tracker: &mut ChangeTracker<T>,
    ) -> RepoResult<Vec<T>> {
        let mut committed = Vec::with_capacity(tracker.len());
        for change in tracker.drain() {
            committed.push(self.apply(conn, change)?);
        }
        Ok(committed)
    }

    /// Runs one change through its state path.
    pub fn apply<T: Record>(&self, conn: &Connection, change: PendingChange<T>) -> RepoResult<T> {
        let state = change.state;
        let id = change.record.id();
        let outcome = match state {
            EntryState::Added => self.apply_added(conn, change.record),
            EntryState::Modified => self.apply_modified(conn, change.record, change.shape),
            EntryState::Deleted => self.apply_deleted(conn, change),
        };

        match &outcome {
            Ok(record) => debug!(
                "event=record_write module=interceptor status=committed table={} state={} id={id} version={} operation={}",
                T::TABLE,
                state.as_str(),
                record.meta().version,
                self.context.operation_id
            ),
            Err(err) => warn!(
                "event=record_write module=interceptor status=rejected table={} state={} id={id} operation={} error={err}",
                T::TABLE,
                state.as_str(),
                self.context.operation_id
            ),
        }
        outcome
    }

    fn apply_added<T: Record>(&self, conn: &Connection, mut record: T) -> RepoResult<T> {
        record.validate_payload()?;
        {
            let meta = record.meta_mut();
            meta.version = INITIAL_VERSION;
            meta.deleted = None;
        }
        self.stamper
            .stamp(record.meta_mut(), StampMode::Create, &self.context);
        record.validate()?;

        match sql::insert(conn, &record) {
            Ok(_) => Ok(record),
            Err(err) => match sql::unique_violation_detail(&err) {
                Some(detail) => Err(RepoError::DuplicateKey {
                    table: T::TABLE,
                    detail,
                }),
                None => Err(err.into()),
            },
        }
    }

    fn apply_modified<T: Record>(
        &self,
        conn: &Connection,
        mut record: T,
        shape: UpdateShape,
    ) -> RepoResult<T> {
        record.validate_payload()?;
        self.guard.check_and_bump(conn, &mut record)?;
        self.stamper
            .stamp(record.meta_mut(), StampMode::Update, &self.context);
        if shape == UpdateShape::Revival {
            record.meta_mut().deleted = None;
        }
        record.validate()?;

        let changed = match sql::update(conn, &record, shape) {
            Ok(changed) => changed,
            Err(RepoError::Db(DbError::Sqlite(err))) => {
                return Err(match sql::unique_violation_detail(&err) {
                    Some(detail) => RepoError::DuplicateKey {
                        table: T::TABLE,
                        detail,
                    },
                    None => err.into(),
                });
            }
            Err(err) => return Err(err),
        };
        if changed == 0 {
            return Err(RepoError::NotFound(record.id()));
        }
        stored::<T>(conn, record.id())
    }

    fn apply_deleted<T: Record>(&self, conn: &Connection, change: PendingChange<T>) -> RepoResult<T> {
        let mut rewritten = soft_delete::rewrite_delete(change);
        let id = rewritten.record.id();
        self.stamper
            .stamp(rewritten.record.meta_mut(), StampMode::Delete, &self.context);

        // Zero rows means missing or already soft-deleted; the latter keeps
        // its first deletion stamp.
        sql::update(conn, &rewritten.record, rewritten.shape)?;
        stored::<T>(conn, id)
    }
}

/// Row as persisted, so callers never see columns a shaped update skipped.
fn stored<T: Record>(conn: &Connection, id: RecordId) -> RepoResult<T> {
    sql::load_by_id::<T>(conn, id, ReadScope::IncludingDeleted)?.ok_or(RepoError::NotFound(id))
}
