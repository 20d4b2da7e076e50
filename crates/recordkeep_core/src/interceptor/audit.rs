//! Audit stamping for pending changes.
//!
//! # Responsibility
//! - Resolve the acting principal and operation for a save.
//! - Fill created/updated/deleted stamps according to the change kind.
//!
//! # Invariants
//! - Create sets `created` and `updated` to the same stamp.
//! - Update touches `updated` only; `created` is immutable past creation.
//! - Delete touches `deleted` only.
//! - Stamps issued by [`SystemClock`] are strictly increasing per process.

use crate::model::record::{RecordMeta, Stamp};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

pub const SYSTEM_ACTOR: &str = "system";
pub const UNKNOWN_RESOURCE: &str = "UnknownController";
pub const UNKNOWN_ACTION: &str = "UnknownAction";

/// Actor and operation attribution for one save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationContext {
    pub actor_id: String,
    /// Composed as `<resource>-<action>`.
    pub operation_id: String,
}

impl OperationContext {
    pub fn new(actor_id: impl Into<String>, operation_id: impl Into<String>) -> Self {
        Self {
            actor_id: actor_id.into(),
            operation_id: operation_id.into(),
        }
    }

    /// Builds a context from request-pipeline values, applying per-part
    /// fallbacks for anything that could not be resolved.
    pub fn from_request(actor_id: Option<&str>, resource: Option<&str>, action: Option<&str>) -> Self {
        let actor_id = non_blank(actor_id).unwrap_or(SYSTEM_ACTOR);
        let resource = non_blank(resource).unwrap_or(UNKNOWN_RESOURCE);
        let action = non_blank(action).unwrap_or(UNKNOWN_ACTION);
        Self::new(actor_id, format!("{resource}-{action}"))
    }
}

impl Default for OperationContext {
    fn default() -> Self {
        Self::from_request(None, None, None)
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

/// Source of the current actor/operation, consulted once per save.
pub trait ContextProvider: Send + Sync {
    fn current_context(&self) -> OperationContext;
}

impl ContextProvider for OperationContext {
    fn current_context(&self) -> OperationContext {
        self.clone()
    }
}

/// Millisecond wall clock used for audit stamps.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

static LAST_ISSUED_MS: AtomicI64 = AtomicI64::new(0);

/// System time clock that never returns the same millisecond twice.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        let wall = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX));
        let mut previous = LAST_ISSUED_MS.load(Ordering::Relaxed);
        loop {
            let next = wall.max(previous.saturating_add(1));
            match LAST_ISSUED_MS.compare_exchange_weak(
                previous,
                next,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return next,
                Err(actual) => previous = actual,
            }
        }
    }
}

/// Which audit triple a change should receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StampMode {
    Create,
    Update,
    Delete,
}

/// Computes audit stamps from an operation context and a clock.
#[derive(Clone)]
pub struct AuditStamper {
    clock: Arc<dyn Clock>,
}

impl AuditStamper {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Stamps `meta` in place. Pure in-memory mutation.
    pub fn stamp(&self, meta: &mut RecordMeta, mode: StampMode, context: &OperationContext) {
        let stamp = Stamp {
            actor_id: context.actor_id.clone(),
            at_ms: self.clock.now_ms(),
            operation_id: context.operation_id.clone(),
        };
        match mode {
            StampMode::Create => {
                meta.created = stamp.clone();
                meta.updated = stamp;
            }
            StampMode::Update => meta.updated = stamp,
            StampMode::Delete => meta.deleted = Some(stamp),
        }
    }
}

impl Default for AuditStamper {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}
