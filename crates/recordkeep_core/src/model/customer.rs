//! Customer record.
//!
//! # Invariants
//! - `email` is unique across live and soft-deleted rows.
//! - `email` is non-empty and contains `@`.

use rusqlite::types::Value;
use rusqlite::Row;
use serde::{Deserialize, Serialize};

use super::record::{Record, RecordId, RecordMeta, RecordValidationError};
use crate::repo::RepoResult;

/// Customer account record backed by the `customers` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    pub meta: RecordMeta,
    pub email: String,
    pub display_name: String,
    pub note: Option<String>,
}

impl Customer {
    /// Creates an unsaved customer with a generated id.
    pub fn new(email: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            meta: RecordMeta::new(),
            email: email.into(),
            display_name: display_name.into(),
            note: None,
        }
    }

    /// Creates an unsaved customer with a caller-provided id.
    pub fn with_id(
        id: RecordId,
        email: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Self {
        Self {
            meta: RecordMeta::with_id(id),
            ..Self::new(email, display_name)
        }
    }
}

impl PartialEq for Customer {
    fn eq(&self, other: &Self) -> bool {
        self.meta.id == other.meta.id
    }
}

impl Eq for Customer {}

impl Record for Customer {
    const TABLE: &'static str = "customers";
    const PAYLOAD_COLUMNS: &'static [&'static str] = &["email", "display_name", "note"];

    fn meta(&self) -> &RecordMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut RecordMeta {
        &mut self.meta
    }

    fn payload_values(&self) -> Vec<Value> {
        vec![
            Value::Text(self.email.clone()),
            Value::Text(self.display_name.clone()),
            self.note.clone().map_or(Value::Null, Value::Text),
        ]
    }

    fn from_row(meta: RecordMeta, row: &Row<'_>) -> RepoResult<Self> {
        Ok(Self {
            meta,
            email: row.get("email")?,
            display_name: row.get("display_name")?,
            note: row.get("note")?,
        })
    }

    fn validate_payload(&self) -> Result<(), RecordValidationError> {
        let email = self.email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err(RecordValidationError::InvalidField {
                field: "email",
                reason: "must be a non-empty address containing `@`",
            });
        }
        Ok(())
    }
}
