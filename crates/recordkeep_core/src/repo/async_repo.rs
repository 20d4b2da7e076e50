//! Async facade over the blocking SQLite repository.
//!
//! # Responsibility
//! - Offer every repository operation as an `async fn`.
//! - Run the blocking SQLite work on tokio's blocking pool.
//!
//! # Invariants
//! - Cancellation is observed before the work is dispatched and again once
//!   the connection is held for a write. A cancelled call performs no write.
//! - Results and failure modes match the sync repository exactly.

use crate::interceptor::PendingChange;
use crate::model::record::Record;
use crate::repo::filter::Filter;
use crate::repo::record_repo::{RecordRepository, SqliteRecordRepository};
use crate::repo::transaction::TransactionState;
use crate::repo::{RepoError, RepoResult};
use tokio_util::sync::CancellationToken;

/// Async repository for record type `T`.
pub struct AsyncRecordRepository<T> {
    inner: SqliteRecordRepository<T>,
    cancel: CancellationToken,
}

impl<T> Clone for AsyncRecordRepository<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            cancel: self.cancel.clone(),
        }
    }
}

impl<T: Record> AsyncRecordRepository<T> {
    pub fn new(inner: SqliteRecordRepository<T>) -> Self {
        Self::with_cancellation(inner, CancellationToken::new())
    }

    /// Binds the repository to `cancel`. Cancelling the token makes every
    /// later call fail with `RepoError::Cancelled`.
    pub fn with_cancellation(inner: SqliteRecordRepository<T>, cancel: CancellationToken) -> Self {
        Self { inner, cancel }
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Blocking repository this facade dispatches to.
    pub fn blocking(&self) -> &SqliteRecordRepository<T> {
        &self.inner
    }

    async fn dispatch<R, F>(&self, work: F) -> RepoResult<R>
    where
        R: Send + 'static,
        F: FnOnce(SqliteRecordRepository<T>, CancellationToken) -> RepoResult<R> + Send + 'static,
    {
        if self.cancel.is_cancelled() {
            return Err(RepoError::Cancelled);
        }
        let repo = self.inner.clone();
        let cancel = self.cancel.clone();
        tokio::task::spawn_blocking(move || work(repo, cancel))
            .await
            .map_err(|err| RepoError::TaskJoin(err.to_string()))?
    }

    pub async fn find(&self, filter: &Filter) -> RepoResult<Option<T>> {
        let filter = filter.clone();
        self.dispatch(move |repo, _| repo.find(&filter)).await
    }

    pub async fn find_including_deleted(&self, filter: &Filter) -> RepoResult<Option<T>> {
        let filter = filter.clone();
        self.dispatch(move |repo, _| repo.find_including_deleted(&filter))
            .await
    }

    pub async fn get_all(&self) -> RepoResult<Vec<T>> {
        self.dispatch(|repo, _| repo.get_all()).await
    }

    pub async fn get_all_including_deleted(&self) -> RepoResult<Vec<T>> {
        self.dispatch(|repo, _| repo.get_all_including_deleted())
            .await
    }

    pub async fn list(&self, filter: &Filter) -> RepoResult<Vec<T>> {
        let filter = filter.clone();
        self.dispatch(move |repo, _| repo.list(&filter)).await
    }

    pub async fn exists(&self, filter: &Filter) -> RepoResult<bool> {
        let filter = filter.clone();
        self.dispatch(move |repo, _| repo.exists(&filter)).await
    }

    pub async fn count(&self, filter: &Filter) -> RepoResult<u64> {
        let filter = filter.clone();
        self.dispatch(move |repo, _| repo.count(&filter)).await
    }

    pub async fn count_including_deleted(&self, filter: &Filter) -> RepoResult<u64> {
        let filter = filter.clone();
        self.dispatch(move |repo, _| repo.count_including_deleted(&filter))
            .await
    }

    pub async fn add(&self, record: T) -> RepoResult<T> {
        self.dispatch(move |repo, cancel| repo.save_one(record, PendingChange::added, Some(&cancel)))
            .await
    }

    pub async fn add_range(&self, records: Vec<T>) -> RepoResult<Vec<T>> {
        self.dispatch(move |repo, cancel| repo.save(records, PendingChange::added, Some(&cancel)))
            .await
    }

    pub async fn update(&self, record: T) -> RepoResult<T> {
        self.dispatch(move |repo, cancel| {
            repo.save_one(record, PendingChange::modified, Some(&cancel))
        })
        .await
    }

    pub async fn update_range(&self, records: Vec<T>) -> RepoResult<Vec<T>> {
        self.dispatch(move |repo, cancel| {
            repo.save(records, PendingChange::modified, Some(&cancel))
        })
        .await
    }

    pub async fn delete(&self, record: T) -> RepoResult<T> {
        self.dispatch(move |repo, cancel| {
            repo.save_one(record, PendingChange::deleted, Some(&cancel))
        })
        .await
    }

    pub async fn delete_range(&self, records: Vec<T>) -> RepoResult<Vec<T>> {
        self.dispatch(move |repo, cancel| {
            repo.save(records, PendingChange::deleted, Some(&cancel))
        })
        .await
    }

    pub async fn revive(&self, record: T) -> RepoResult<T> {
        self.dispatch(move |repo, cancel| {
            repo.save_one(record, PendingChange::revived, Some(&cancel))
        })
        .await
    }

    pub async fn hard_delete(&self, record: T) -> RepoResult<()> {
        self.dispatch(move |repo, cancel| repo.hard_delete_with(&record, Some(&cancel)))
            .await
    }

    pub async fn upsert(&self, record: T, filter: &Filter) -> RepoResult<T> {
        let filter = filter.clone();
        self.dispatch(move |repo, cancel| repo.upsert_with(record, &filter, Some(&cancel)))
            .await
    }

    pub async fn begin_transaction(&self) -> RepoResult<()> {
        self.dispatch(|repo, _| repo.begin_transaction()).await
    }

    pub async fn commit_transaction(&self) -> RepoResult<()> {
        self.dispatch(|repo, _| repo.commit_transaction()).await
    }

    /// Rolls back even when the token is cancelled, so a cancelled caller
    /// can still release its scope.
    pub async fn rollback_transaction(&self) -> RepoResult<()> {
        let repo = self.inner.clone();
        tokio::task::spawn_blocking(move || repo.rollback_transaction())
            .await
            .map_err(|err| RepoError::TaskJoin(err.to_string()))?
    }

    pub async fn transaction_state(&self) -> RepoResult<TransactionState> {
        self.inner.transaction_state()
    }
}
