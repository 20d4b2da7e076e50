//! Explicit transaction scope state machine.
//!
//! # Invariants
//! - At most one scope is `Active` per storage context.
//! - `begin` while `Active`, and `commit`/`rollback` while not `Active`,
//!   fail fast with `RepoError::TransactionState`.
//! - A failed commit rolls back before the error is returned.
//! - Rollback always leaves the scope `RolledBack`, even when SQLite reports
//!   an error, so the transaction handle is released on every exit path.

use crate::repo::{RepoError, RepoResult};
use log::{error, info, warn};
use rusqlite::Connection;
use std::fmt::{Display, Formatter};

/// Lifecycle of the transaction scope owned by a storage context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransactionState {
    /// No scope has been started yet.
    #[default]
    Idle,
    Active,
    Committed,
    RolledBack,
}

impl TransactionState {
    pub fn is_active(self) -> bool {
        self == Self::Active
    }
}

impl Display for TransactionState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Idle => "idle",
            Self::Active => "active",
            Self::Committed => "committed",
            Self::RolledBack => "rolled back",
        };
        f.write_str(label)
    }
}

fn require_active(state: TransactionState, action: &'static str) -> RepoResult<()> {
    if state.is_active() {
        Ok(())
    } else {
        Err(RepoError::TransactionState { action, state })
    }
}

pub(crate) fn begin(conn: &Connection, state: &mut TransactionState) -> RepoResult<()> {
    if state.is_active() {
        return Err(RepoError::TransactionState {
            action: "begin a transaction",
            state: *state,
        });
    }
    conn.execute_batch("BEGIN IMMEDIATE;")?;
    *state = TransactionState::Active;
    info!("event=tx_begin module=repo status=ok");
    Ok(())
}

pub(crate) fn commit(conn: &Connection, state: &mut TransactionState) -> RepoResult<()> {
    require_active(*state, "commit")?;
    match conn.execute_batch("COMMIT;") {
        Ok(()) => {
            *state = TransactionState::Committed;
            info!("event=tx_commit module=repo status=ok");
            Ok(())
        }
        Err(err) => {
            error!("event=tx_commit module=repo status=error error={err}");
            release(conn, state, "commit_failed");
            Err(err.into())
        }
    }
}

pub(crate) fn rollback(conn: &Connection, state: &mut TransactionState) -> RepoResult<()> {
    require_active(*state, "roll back")?;
    release(conn, state, "requested");
    Ok(())
}

/// Rolls the active scope back and marks it `RolledBack` unconditionally.
pub(crate) fn release(conn: &Connection, state: &mut TransactionState, reason: &str) {
    if conn.is_autocommit() {
        // SQLite already ended the transaction (e.g. after a fatal error).
        *state = TransactionState::RolledBack;
        warn!("event=tx_rollback module=repo status=ok reason={reason} note=already_closed");
        return;
    }
    match conn.execute_batch("ROLLBACK;") {
        Ok(()) => info!("event=tx_rollback module=repo status=ok reason={reason}"),
        Err(err) => {
            error!("event=tx_rollback module=repo status=error reason={reason} error={err}")
        }
    }
    *state = TransactionState::RolledBack;
}
