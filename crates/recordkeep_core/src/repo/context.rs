//! Storage context: one SQLite connection plus its transaction scope.
//!
//! # Responsibility
//! - Own the connection and serialise access to it.
//! - Run writes inside either the active scope or an implicit transaction.
//! - Hand the write interceptor the current actor/operation and clock.
//!
//! # Invariants
//! - A context is one unit-of-work handle. Concurrent callers open their own
//!   context (SQLite arbitrates between connections); clones of a context
//!   share its connection and its transaction scope.
//! - A write error inside an active scope rolls the whole scope back.
//! - Dropping the last handle with an active scope rolls it back.

use crate::db::{open_db_in_memory, DbResult};
use crate::interceptor::audit::{AuditStamper, Clock, ContextProvider, OperationContext, SystemClock};
use crate::interceptor::WriteInterceptor;
use crate::repo::transaction::{self, TransactionState};
use crate::repo::{RepoError, RepoResult};
use log::warn;
use rusqlite::{Connection, TransactionBehavior};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

struct ContextState {
    conn: Connection,
    transaction: TransactionState,
    provider: Arc<dyn ContextProvider>,
    clock: Arc<dyn Clock>,
}

impl Drop for ContextState {
    fn drop(&mut self) {
        if self.transaction.is_active() {
            warn!("event=tx_rollback module=repo status=start reason=context_dropped");
            transaction::release(&self.conn, &mut self.transaction, "context_dropped");
        }
    }
}

/// Shared handle to a migrated SQLite connection.
#[derive(Clone)]
pub struct StoreContext {
    state: Arc<Mutex<ContextState>>,
}

impl StoreContext {
    /// Wraps a migrated connection using the `system` context and the
    /// system clock.
    pub fn new(conn: Connection) -> Self {
        Self::with_parts(conn, Arc::new(OperationContext::default()), Arc::new(SystemClock))
    }

    pub fn with_parts(
        conn: Connection,
        provider: Arc<dyn ContextProvider>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            state: Arc::new(Mutex::new(ContextState {
                conn,
                transaction: TransactionState::Idle,
                provider,
                clock,
            })),
        }
    }

    /// Opens a fresh in-memory database.
    pub fn in_memory() -> DbResult<Self> {
        Ok(Self::new(open_db_in_memory()?))
    }

    /// Replaces the actor/operation source for subsequent saves.
    pub fn set_context_provider(&self, provider: Arc<dyn ContextProvider>) -> RepoResult<()> {
        self.lock()?.provider = provider;
        Ok(())
    }

    pub fn transaction_state(&self) -> RepoResult<TransactionState> {
        Ok(self.lock()?.transaction)
    }

    pub fn begin_transaction(&self) -> RepoResult<()> {
        let mut guard = self.lock()?;
        let state = &mut *guard;
        transaction::begin(&state.conn, &mut state.transaction)
    }

    pub fn commit_transaction(&self) -> RepoResult<()> {
        let mut guard = self.lock()?;
        let state = &mut *guard;
        transaction::commit(&state.conn, &mut state.transaction)
    }

    pub fn rollback_transaction(&self) -> RepoResult<()> {
        let mut guard = self.lock()?;
        let state = &mut *guard;
        transaction::rollback(&state.conn, &mut state.transaction)
    }

    fn lock(&self) -> RepoResult<MutexGuard<'_, ContextState>> {
        self.state.lock().map_err(|_| RepoError::LockPoisoned)
    }

    /// Runs a read against the connection. Reads inside an active scope see
    /// the scope's uncommitted writes.
    pub(crate) fn read<R>(&self, body: impl FnOnce(&Connection) -> RepoResult<R>) -> RepoResult<R> {
        let guard = self.lock()?;
        body(&guard.conn)
    }

    /// Runs a write body with a fresh interceptor.
    ///
    /// Outside a scope the body gets its own immediate transaction, so
    /// multi-record writes are all-or-nothing. Inside a scope a failing body
    /// rolls the scope back. `cancel` is checked once the connection is held
    /// and before the body issues anything.
    pub(crate) fn write<R>(
        &self,
        cancel: Option<&CancellationToken>,
        body: impl FnOnce(&Connection, &WriteInterceptor) -> RepoResult<R>,
    ) -> RepoResult<R> {
        let mut guard = self.lock()?;
        if cancel.is_some_and(CancellationToken::is_cancelled) {
            return Err(RepoError::Cancelled);
        }

        let state = &mut *guard;
        let interceptor = WriteInterceptor::new(
            AuditStamper::new(Arc::clone(&state.clock)),
            state.provider.current_context(),
        );

        if state.transaction.is_active() {
            return body(&state.conn, &interceptor).inspect_err(|_| {
                transaction::release(&state.conn, &mut state.transaction, "write_rejected");
            });
        }

        let tx = state
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let output = body(&tx, &interceptor)?;
        tx.commit()?;
        Ok(output)
    }
}
