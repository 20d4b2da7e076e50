//! Generic record repository contract and SQLite implementation.
//!
//! # Responsibility
//! - Provide one CRUD + transaction surface for every `Record` type.
//! - Route add/update/delete/revive through the write interceptor.
//!
//! # Invariants
//! - `find`/`get_all`/`exists`/`count` only see live rows.
//! - `hard_delete` bypasses the interceptor: no audit, no version check.
//! - `upsert` checks existence and writes in two steps. Two concurrent
//!   upserts may both take the add path; the loser gets `DuplicateKey`.

use crate::interceptor::soft_delete::ReadScope;
use crate::interceptor::{ChangeTracker, PendingChange};
use crate::model::record::Record;
use crate::repo::context::StoreContext;
use crate::repo::filter::Filter;
use crate::repo::sql;
use crate::repo::transaction::TransactionState;
use crate::repo::{RepoError, RepoResult};
use log::{debug, info};
use rusqlite::params_from_iter;
use rusqlite::types::Value;
use std::marker::PhantomData;
use tokio_util::sync::CancellationToken;

/// Repository interface for one record type.
pub trait RecordRepository<T: Record> {
    /// First live record matching `filter`, ordered by id.
    fn find(&self, filter: &Filter) -> RepoResult<Option<T>>;
    /// Like `find`, but soft-deleted rows are visible.
    fn find_including_deleted(&self, filter: &Filter) -> RepoResult<Option<T>>;
    /// All live records ordered by id.
    fn get_all(&self) -> RepoResult<Vec<T>>;
    /// All records, soft-deleted included, ordered by id.
    fn get_all_including_deleted(&self) -> RepoResult<Vec<T>>;
    /// All live records matching `filter`, ordered by id.
    fn list(&self, filter: &Filter) -> RepoResult<Vec<T>>;
    fn exists(&self, filter: &Filter) -> RepoResult<bool>;
    fn count(&self, filter: &Filter) -> RepoResult<u64>;
    fn count_including_deleted(&self, filter: &Filter) -> RepoResult<u64>;

    /// Inserts a new record. Fails with `DuplicateKey` on key collision.
    fn add(&self, record: T) -> RepoResult<T>;
    /// Inserts all records or none.
    fn add_range(&self, records: Vec<T>) -> RepoResult<Vec<T>>;
    /// Updates an existing record. Fails with `ConcurrencyConflict` on a
    /// stale version.
    fn update(&self, record: T) -> RepoResult<T>;
    fn update_range(&self, records: Vec<T>) -> RepoResult<Vec<T>>;
    /// Soft-deletes a record.
    fn delete(&self, record: T) -> RepoResult<T>;
    fn delete_range(&self, records: Vec<T>) -> RepoResult<Vec<T>>;
    /// Clears the deletion stamp of a soft-deleted record and refreshes its
    /// updated stamp.
    fn revive(&self, record: T) -> RepoResult<T>;
    /// Physically removes a row. Irreversible.
    fn hard_delete(&self, record: &T) -> RepoResult<()>;
    /// `update` when a live row matches `filter`, otherwise `add`.
    fn upsert(&self, record: T, filter: &Filter) -> RepoResult<T>;

    fn begin_transaction(&self) -> RepoResult<()>;
    fn commit_transaction(&self) -> RepoResult<()>;
    fn rollback_transaction(&self) -> RepoResult<()>;
    fn transaction_state(&self) -> RepoResult<TransactionState>;
}

/// SQLite-backed repository for record type `T`.
pub struct SqliteRecordRepository<T> {
    context: StoreContext,
    _record: PhantomData<fn() -> T>,
}

impl<T> Clone for SqliteRecordRepository<T> {
    fn clone(&self) -> Self {
        Self {
            context: self.context.clone(),
            _record: PhantomData,
        }
    }
}

impl<T: Record> SqliteRecordRepository<T> {
    pub fn new(context: StoreContext) -> Self {
        Self {
            context,
            _record: PhantomData,
        }
    }

    pub fn context(&self) -> &StoreContext {
        &self.context
    }

    fn where_clause(filter: &Filter, scope: ReadScope, binds: &mut Vec<Value>) -> RepoResult<String> {
        let mut clause = format!("WHERE ({})", filter.to_sql::<T>(binds)?);
        if let Some(predicate) = scope.predicate() {
            clause.push_str(" AND ");
            clause.push_str(predicate);
        }
        Ok(clause)
    }

    pub(crate) fn query(&self, filter: &Filter, scope: ReadScope, limit: Option<u32>) -> RepoResult<Vec<T>> {
        let mut binds = Vec::new();
        let mut query = format!(
            "{} {} ORDER BY id ASC",
            sql::select_sql::<T>(),
            Self::where_clause(filter, scope, &mut binds)?
        );
        if let Some(limit) = limit {
            binds.push(Value::Integer(i64::from(limit)));
            query.push_str(&format!(" LIMIT ?{}", binds.len()));
        }

        self.context.read(|conn| {
            let mut stmt = conn.prepare(&query)?;
            let mut rows = stmt.query(params_from_iter(binds))?;
            let mut records = Vec::new();
            while let Some(row) = rows.next()? {
                records.push(sql::decode_row::<T>(row)?);
            }
            Ok(records)
        })
    }

    pub(crate) fn count_in(&self, filter: &Filter, scope: ReadScope) -> RepoResult<u64> {
        let mut binds = Vec::new();
        let query = format!(
            "SELECT COUNT(*) FROM {} {}",
            T::TABLE,
            Self::where_clause(filter, scope, &mut binds)?
        );
        self.context.read(|conn| {
            let count = conn.query_row(&query, params_from_iter(binds), |row| row.get::<_, i64>(0))?;
            u64::try_from(count)
                .map_err(|_| RepoError::InvalidData(format!("negative row count {count}")))
        })
    }

    /// Registers `records` with `make` and flushes them as one save.
    pub(crate) fn save(
        &self,
        records: Vec<T>,
        make: fn(T) -> PendingChange<T>,
        cancel: Option<&CancellationToken>,
    ) -> RepoResult<Vec<T>> {
        let mut tracker = ChangeTracker::new();
        tracker.register_all(records, make);
        if tracker.is_empty() {
            return Ok(Vec::new());
        }
        self.context
            .write(cancel, |conn, interceptor| interceptor.save_changes(conn, &mut tracker))
    }

    pub(crate) fn save_one(
        &self,
        record: T,
        make: fn(T) -> PendingChange<T>,
        cancel: Option<&CancellationToken>,
    ) -> RepoResult<T> {
        self.context
            .write(cancel, |conn, interceptor| interceptor.apply(conn, make(record)))
    }

    pub(crate) fn hard_delete_with(&self, record: &T, cancel: Option<&CancellationToken>) -> RepoResult<()> {
        let id = record.id();
        self.context.write(cancel, |conn, _| {
            if sql::delete_physical::<T>(conn, id)? == 0 {
                return Err(RepoError::NotFound(id));
            }
            info!("event=record_hard_delete module=repo status=ok table={} id={id}", T::TABLE);
            Ok(())
        })
    }

    /// Adds `record` when `filter` matches no live row, otherwise updates the
    /// matched row.
    ///
    /// A record that is not itself among the matches takes over the identity
    /// and version of the single matched row. Several matches that do not
    /// include the record's own id are rejected.
    pub(crate) fn upsert_with(
        &self,
        mut record: T,
        filter: &Filter,
        cancel: Option<&CancellationToken>,
    ) -> RepoResult<T> {
        let matched = self.query(filter, ReadScope::LiveOnly, None)?;
        if matched.is_empty() {
            debug!("event=record_upsert module=repo table={} path=add", T::TABLE);
            return self.save_one(record, PendingChange::added, cancel);
        }

        if !matched.iter().any(|row| row.id() == record.id()) {
            let [existing] = matched.as_slice() else {
                return Err(RepoError::AmbiguousUpsert {
                    table: T::TABLE,
                    matches: matched.len(),
                });
            };
            let meta = record.meta_mut();
            meta.id = existing.id();
            meta.version = existing.meta().version;
        }
        debug!(
            "event=record_upsert module=repo table={} path=update id={}",
            T::TABLE,
            record.id()
        );
        self.save_one(record, PendingChange::modified, cancel)
    }
}

impl<T: Record> RecordRepository<T> for SqliteRecordRepository<T> {
    fn find(&self, filter: &Filter) -> RepoResult<Option<T>> {
        Ok(self.query(filter, ReadScope::LiveOnly, Some(1))?.into_iter().next())
    }

    fn find_including_deleted(&self, filter: &Filter) -> RepoResult<Option<T>> {
        Ok(self
            .query(filter, ReadScope::IncludingDeleted, Some(1))?
            .into_iter()
            .next())
    }

    fn get_all(&self) -> RepoResult<Vec<T>> {
        self.query(&Filter::All, ReadScope::LiveOnly, None)
    }

    fn get_all_including_deleted(&self) -> RepoResult<Vec<T>> {
        self.query(&Filter::All, ReadScope::IncludingDeleted, None)
    }

    fn list(&self, filter: &Filter) -> RepoResult<Vec<T>> {
        self.query(filter, ReadScope::LiveOnly, None)
    }

    fn exists(&self, filter: &Filter) -> RepoResult<bool> {
        Ok(self.count_in(filter, ReadScope::LiveOnly)? > 0)
    }

    fn count(&self, filter: &Filter) -> RepoResult<u64> {
        self.count_in(filter, ReadScope::LiveOnly)
    }

    fn count_including_deleted(&self, filter: &Filter) -> RepoResult<u64> {
        self.count_in(filter, ReadScope::IncludingDeleted)
    }

    fn add(&self, record: T) -> RepoResult<T> {
        self.save_one(record, PendingChange::added, None)
    }

    fn add_range(&self, records: Vec<T>) -> RepoResult<Vec<T>> {
        self.save(records, PendingChange::added, None)
    }

    fn update(&self, record: T) -> RepoResult<T> {
        self.save_one(record, PendingChange::modified, None)
    }

    fn update_range(&self, records: Vec<T>) -> RepoResult<Vec<T>> {
        self.save(records, PendingChange::modified, None)
    }

    fn delete(&self, record: T) -> RepoResult<T> {
        self.save_one(record, PendingChange::deleted, None)
    }

    fn delete_range(&self, records: Vec<T>) -> RepoResult<Vec<T>> {
        self.save(records, PendingChange::deleted, None)
    }

    fn revive(&self, record: T) -> RepoResult<T> {
        self.save_one(record, PendingChange::revived, None)
    }

    fn hard_delete(&self, record: &T) -> RepoResult<()> {
        self.hard_delete_with(record, None)
    }

    fn upsert(&self, record: T, filter: &Filter) -> RepoResult<T> {
        self.upsert_with(record, filter, None)
    }

    fn begin_transaction(&self) -> RepoResult<()> {
        self.context.begin_transaction()
    }

    fn commit_transaction(&self) -> RepoResult<()> {
        self.context.commit_transaction()
    }

    fn rollback_transaction(&self) -> RepoResult<()> {
        self.context.rollback_transaction()
    }

    fn transaction_state(&self) -> RepoResult<TransactionState> {
        self.context.transaction_state()
    }
}
