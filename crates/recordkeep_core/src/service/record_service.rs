//! Record use-case service.
//!
//! # Responsibility
//! - Provide stable CRUD entry points for core callers.
//! - Run multi-step use cases inside one explicit transaction scope.
//!
//! # Invariants
//! - Service APIs never bypass repository validation/persistence contracts.
//! - `transactional` always leaves the scope `Committed` or `RolledBack`.

use crate::model::record::Record;
use crate::repo::{Filter, RecordRepository, RepoResult, TransactionState};
use log::warn;
use std::marker::PhantomData;

/// Use-case service wrapper for one record type.
pub struct RecordService<T, R> {
    repo: R,
    _record: PhantomData<fn() -> T>,
}

impl<T: Record, R: RecordRepository<T>> RecordService<T, R> {
    /// Creates a service using the provided repository implementation.
    pub fn new(repo: R) -> Self {
        Self {
            repo,
            _record: PhantomData,
        }
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    pub fn find(&self, filter: &Filter) -> RepoResult<Option<T>> {
        self.repo.find(filter)
    }

    pub fn find_including_deleted(&self, filter: &Filter) -> RepoResult<Option<T>> {
        self.repo.find_including_deleted(filter)
    }

    pub fn get_all(&self) -> RepoResult<Vec<T>> {
        self.repo.get_all()
    }

    pub fn list(&self, filter: &Filter) -> RepoResult<Vec<T>> {
        self.repo.list(filter)
    }

    pub fn exists(&self, filter: &Filter) -> RepoResult<bool> {
        self.repo.exists(filter)
    }

    pub fn count(&self, filter: &Filter) -> RepoResult<u64> {
        self.repo.count(filter)
    }

    pub fn add(&self, record: T) -> RepoResult<T> {
        self.repo.add(record)
    }

    pub fn add_range(&self, records: Vec<T>) -> RepoResult<Vec<T>> {
        self.repo.add_range(records)
    }

    /// Returns repository-level conflict, not-found or validation errors
    /// unchanged.
    pub fn update(&self, record: T) -> RepoResult<T> {
        self.repo.update(record)
    }

    pub fn update_range(&self, records: Vec<T>) -> RepoResult<Vec<T>> {
        self.repo.update_range(records)
    }

    pub fn delete(&self, record: T) -> RepoResult<T> {
        self.repo.delete(record)
    }

    pub fn delete_range(&self, records: Vec<T>) -> RepoResult<Vec<T>> {
        self.repo.delete_range(records)
    }

    pub fn revive(&self, record: T) -> RepoResult<T> {
        self.repo.revive(record)
    }

    pub fn hard_delete(&self, record: &T) -> RepoResult<()> {
        self.repo.hard_delete(record)
    }

    pub fn upsert(&self, record: T, filter: &Filter) -> RepoResult<T> {
        self.repo.upsert(record, filter)
    }

    /// Runs `work` inside a fresh transaction scope.
    ///
    /// # Contract
    /// - `Ok` from `work` commits; a failed commit is returned as the error.
    /// - `Err` from `work` rolls back (unless a failing write already did)
    ///   and returns the original error.
    pub fn transactional<O>(&self, work: impl FnOnce(&R) -> RepoResult<O>) -> RepoResult<O> {
        self.repo.begin_transaction()?;
        match work(&self.repo) {
            Ok(output) => {
                self.repo.commit_transaction()?;
                Ok(output)
            }
            Err(err) => {
                match self.repo.transaction_state() {
                    Ok(TransactionState::Active) => {
                        if let Err(rollback_err) = self.repo.rollback_transaction() {
                            warn!(
                                "event=tx_rollback module=service status=error error={rollback_err}"
                            );
                        }
                    }
                    Ok(_) => {}
                    Err(state_err) => warn!(
                        "event=tx_rollback module=service status=skipped error={state_err}"
                    ),
                }
                Err(err)
            }
        }
    }
}
