//! Shared record metadata and the `Record` persistence contract.
//!
//! # Responsibility
//! - Define the audit/version metadata carried by every persisted record.
//! - Describe how a concrete record type maps onto its SQLite table.
//!
//! # Invariants
//! - `id` is stable and never reused for another record.
//! - The deleted triple is set and cleared as one unit (`Option<Stamp>`).
//! - `created.at_ms <= updated.at_ms` and `deleted.at_ms >= created.at_ms`.
//! - Identity equality is by `id` alone.

use rusqlite::types::Value;
use rusqlite::Row;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::repo::RepoResult;

/// Stable identifier for every persisted record.
pub type RecordId = Uuid;

/// Version assigned by the create path.
pub const INITIAL_VERSION: i64 = 1;

/// Metadata columns shared by every record table, in select order.
pub const META_COLUMNS: &[&str] = &[
    "id",
    "created_by",
    "created_at",
    "created_program_id",
    "updated_by",
    "updated_at",
    "updated_program_id",
    "deleted_by",
    "deleted_at",
    "deleted_program_id",
    "version",
];

/// One audit attribution triple: who, when, and through which operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stamp {
    pub actor_id: String,
    /// Unix epoch milliseconds.
    pub at_ms: i64,
    /// `<resource>-<action>` identifier of the writing operation.
    pub operation_id: String,
}

/// Audit and concurrency metadata embedded in every record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMeta {
    pub id: RecordId,
    pub created: Stamp,
    pub updated: Stamp,
    /// `None` while the record is live.
    pub deleted: Option<Stamp>,
    pub version: i64,
}

impl RecordMeta {
    /// Metadata for a record that has not been persisted yet.
    ///
    /// Stamps stay empty until the create path fills them.
    pub fn new() -> Self {
        Self::with_id(Uuid::new_v4())
    }

    /// Metadata for a caller-provided identity (import paths, tests).
    pub fn with_id(id: RecordId) -> Self {
        Self {
            id,
            created: Stamp::default(),
            updated: Stamp::default(),
            deleted: None,
            version: 0,
        }
    }

    /// Returns whether the record is visible to live-only reads.
    pub fn is_live(&self) -> bool {
        self.deleted.is_none()
    }

    /// Checks metadata ordering rules.
    pub fn validate(&self) -> Result<(), RecordValidationError> {
        if self.version < 0 {
            return Err(RecordValidationError::NegativeVersion(self.version));
        }
        if self.created.at_ms > self.updated.at_ms {
            return Err(RecordValidationError::UpdatedBeforeCreated {
                created_at: self.created.at_ms,
                updated_at: self.updated.at_ms,
            });
        }
        if let Some(deleted) = self.deleted.as_ref() {
            if deleted.at_ms < self.created.at_ms {
                return Err(RecordValidationError::DeletedBeforeCreated {
                    created_at: self.created.at_ms,
                    deleted_at: deleted.at_ms,
                });
            }
        }
        Ok(())
    }
}

impl Default for RecordMeta {
    fn default() -> Self {
        Self::new()
    }
}

/// Validation errors raised before writes and after reads.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordValidationError {
    #[error("version must not be negative, got {0}")]
    NegativeVersion(i64),
    #[error("updated_at ({updated_at}) is earlier than created_at ({created_at})")]
    UpdatedBeforeCreated { created_at: i64, updated_at: i64 },
    #[error("deleted_at ({deleted_at}) is earlier than created_at ({created_at})")]
    DeletedBeforeCreated { created_at: i64, deleted_at: i64 },
    #[error("field `{field}` is invalid: {reason}")]
    InvalidField {
        field: &'static str,
        reason: &'static str,
    },
}

/// Persistence contract implemented by every audited, soft-deletable record.
///
/// The generic repository only ever touches payload data through this trait,
/// so metadata handling stays identical across tables.
pub trait Record: Clone + Send + 'static {
    /// Backing table name. Must be a trusted identifier.
    const TABLE: &'static str;
    /// Payload columns in binding order, excluding metadata columns.
    const PAYLOAD_COLUMNS: &'static [&'static str];

    fn meta(&self) -> &RecordMeta;
    fn meta_mut(&mut self) -> &mut RecordMeta;

    /// Payload values in `PAYLOAD_COLUMNS` order.
    fn payload_values(&self) -> Vec<Value>;

    /// Rebuilds a record from decoded metadata plus the payload columns of `row`.
    fn from_row(meta: RecordMeta, row: &Row<'_>) -> RepoResult<Self>;

    /// Payload-specific rules. Metadata rules are checked separately.
    fn validate_payload(&self) -> Result<(), RecordValidationError> {
        Ok(())
    }

    fn id(&self) -> RecordId {
        self.meta().id
    }

    fn validate(&self) -> Result<(), RecordValidationError> {
        self.meta().validate()?;
        self.validate_payload()
    }

    /// Returns whether `column` is a metadata or payload column of this table.
    fn has_column(column: &str) -> bool {
        META_COLUMNS.contains(&column) || Self::PAYLOAD_COLUMNS.contains(&column)
    }
}
