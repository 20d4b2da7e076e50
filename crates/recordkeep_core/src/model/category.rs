//! Category reference-data record.
//!
//! Categories are small, read-mostly lookup rows addressed by a numeric
//! `code`, which makes them the cached record type of the service layer.

use rusqlite::types::Value;
use rusqlite::Row;
use serde::{Deserialize, Serialize};

use super::record::{Record, RecordMeta, RecordValidationError};
use crate::repo::RepoResult;
use crate::service::reference_cache::ReferenceData;

/// Lookup record backed by the `categories` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub meta: RecordMeta,
    /// Unique numeric reference key.
    pub code: i64,
    pub name: String,
    pub sort_order: i64,
}

impl Category {
    pub fn new(code: i64, name: impl Into<String>) -> Self {
        Self {
            meta: RecordMeta::new(),
            code,
            name: name.into(),
            sort_order: 0,
        }
    }
}

impl PartialEq for Category {
    fn eq(&self, other: &Self) -> bool {
        self.meta.id == other.meta.id
    }
}

impl Eq for Category {}

impl Record for Category {
    const TABLE: &'static str = "categories";
    const PAYLOAD_COLUMNS: &'static [&'static str] = &["code", "name", "sort_order"];

    fn meta(&self) -> &RecordMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut RecordMeta {
        &mut self.meta
    }

    fn payload_values(&self) -> Vec<Value> {
        vec![
            Value::Integer(self.code),
            Value::Text(self.name.clone()),
            Value::Integer(self.sort_order),
        ]
    }

    fn from_row(meta: RecordMeta, row: &Row<'_>) -> RepoResult<Self> {
        Ok(Self {
            meta,
            code: row.get("code")?,
            name: row.get("name")?,
            sort_order: row.get("sort_order")?,
        })
    }

    fn validate_payload(&self) -> Result<(), RecordValidationError> {
        if self.name.trim().is_empty() {
            return Err(RecordValidationError::InvalidField {
                field: "name",
                reason: "must not be empty",
            });
        }
        Ok(())
    }
}

impl ReferenceData for Category {
    const KEY_COLUMN: &'static str = "code";

    fn reference_key(&self) -> i64 {
        self.code
    }
}
