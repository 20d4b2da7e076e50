//! SQL text and row mapping shared by every record table.
//!
//! # Invariants
//! - Table and column identifiers only come from `Record` constants.
//! - Values are always bound as parameters.
//! - Read paths reject invalid persisted state instead of masking it.

use crate::interceptor::soft_delete::ReadScope;
use crate::interceptor::UpdateShape;
use crate::model::record::{Record, RecordId, RecordMeta, Stamp, META_COLUMNS};
use crate::repo::{RepoError, RepoResult};
use rusqlite::types::Value;
use rusqlite::{ffi, params_from_iter, Connection, ErrorCode, Row};
use uuid::Uuid;

/// Comma-separated select list: metadata columns, then payload columns.
pub(crate) fn select_columns<T: Record>() -> String {
    META_COLUMNS
        .iter()
        .chain(T::PAYLOAD_COLUMNS.iter())
        .copied()
        .collect::<Vec<_>>()
        .join(", ")
}

pub(crate) fn select_sql<T: Record>() -> String {
    format!("SELECT {} FROM {}", select_columns::<T>(), T::TABLE)
}

/// Loads one row by id within the requested visibility.
pub(crate) fn load_by_id<T: Record>(
    conn: &Connection,
    id: RecordId,
    scope: ReadScope,
) -> RepoResult<Option<T>> {
    let mut sql = format!("{} WHERE id = ?1", select_sql::<T>());
    if let Some(predicate) = scope.predicate() {
        sql.push_str(" AND ");
        sql.push_str(predicate);
    }
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([id.to_string()])?;
    match rows.next()? {
        Some(row) => Ok(Some(decode_row(row)?)),
        None => Ok(None),
    }
}

pub(crate) fn decode_row<T: Record>(row: &Row<'_>) -> RepoResult<T> {
    let meta = decode_meta::<T>(row)?;
    let id = meta.id;
    let record = T::from_row(meta, row)?;
    record.validate().map_err(|err| {
        RepoError::InvalidData(format!("{}.{id} failed validation: {err}", T::TABLE))
    })?;
    Ok(record)
}

fn decode_meta<T: Record>(row: &Row<'_>) -> RepoResult<RecordMeta> {
    let id_text: String = row.get("id")?;
    let id = Uuid::parse_str(&id_text).map_err(|_| {
        RepoError::InvalidData(format!("invalid uuid value `{id_text}` in {}.id", T::TABLE))
    })?;

    let created = Stamp {
        actor_id: row.get("created_by")?,
        at_ms: row.get("created_at")?,
        operation_id: row.get("created_program_id")?,
    };
    let updated = Stamp {
        actor_id: row.get("updated_by")?,
        at_ms: row.get("updated_at")?,
        operation_id: row.get("updated_program_id")?,
    };
    let deleted = match (
        row.get::<_, Option<String>>("deleted_by")?,
        row.get::<_, Option<i64>>("deleted_at")?,
        row.get::<_, Option<String>>("deleted_program_id")?,
    ) {
        (Some(actor_id), Some(at_ms), Some(operation_id)) => Some(Stamp {
            actor_id,
            at_ms,
            operation_id,
        }),
        (None, None, None) => None,
        _ => {
            return Err(RepoError::InvalidData(format!(
                "partially set deletion stamp in {}.{id}",
                T::TABLE
            )));
        }
    };

    Ok(RecordMeta {
        id,
        created,
        updated,
        deleted,
        version: row.get("version")?,
    })
}

fn stamp_values(stamp: &Stamp) -> [Value; 3] {
    [
        Value::Text(stamp.actor_id.clone()),
        Value::Integer(stamp.at_ms),
        Value::Text(stamp.operation_id.clone()),
    ]
}

fn optional_stamp_values(stamp: Option<&Stamp>) -> [Value; 3] {
    stamp.map_or([Value::Null, Value::Null, Value::Null], stamp_values)
}

/// Physical insert of a fully stamped record.
pub(crate) fn insert<T: Record>(conn: &Connection, record: &T) -> rusqlite::Result<usize> {
    let meta = record.meta();
    let mut values = vec![Value::Text(meta.id.to_string())];
    values.extend(stamp_values(&meta.created));
    values.extend(stamp_values(&meta.updated));
    values.extend(optional_stamp_values(meta.deleted.as_ref()));
    values.push(Value::Integer(meta.version));
    values.extend(record.payload_values());

    let placeholders = (1..=values.len())
        .map(|index| format!("?{index}"))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({placeholders});",
        T::TABLE,
        select_columns::<T>()
    );
    conn.execute(&sql, params_from_iter(values))
}

#[derive(Default)]
struct Assignments {
    columns: Vec<String>,
    values: Vec<Value>,
}

impl Assignments {
    fn set(&mut self, column: &str, value: Value) {
        self.values.push(value);
        self.columns.push(format!("{column} = ?{}", self.values.len()));
    }

    fn set_stamp(&mut self, prefix: &str, values: [Value; 3]) {
        let [by, at, program_id] = values;
        self.set(&format!("{prefix}_by"), by);
        self.set(&format!("{prefix}_at"), at);
        self.set(&format!("{prefix}_program_id"), program_id);
    }
}

/// Physical update of an existing row. Returns the number of changed rows.
///
/// `DeletionMarkers` only matches live rows so a repeated delete keeps the
/// first deletion stamp.
pub(crate) fn update<T: Record>(
    conn: &Connection,
    record: &T,
    shape: UpdateShape,
) -> RepoResult<usize> {
    let meta = record.meta();
    let mut assignments = Assignments::default();

    match shape {
        UpdateShape::Payload | UpdateShape::Revival => {
            for (column, value) in T::PAYLOAD_COLUMNS.iter().zip(record.payload_values()) {
                assignments.set(column, value);
            }
            assignments.set_stamp("updated", stamp_values(&meta.updated));
            assignments.set("version", Value::Integer(meta.version));
            if shape == UpdateShape::Revival {
                assignments.set_stamp("deleted", optional_stamp_values(None));
            }
        }
        UpdateShape::DeletionMarkers => {
            let deleted = meta.deleted.as_ref().ok_or_else(|| {
                RepoError::InvalidData(format!(
                    "deletion of {}.{} has no deletion stamp",
                    T::TABLE,
                    meta.id
                ))
            })?;
            assignments.set_stamp("deleted", stamp_values(deleted));
        }
    }

    let Assignments {
        columns,
        mut values,
    } = assignments;
    values.push(Value::Text(meta.id.to_string()));
    let mut sql = format!(
        "UPDATE {} SET {} WHERE id = ?{}",
        T::TABLE,
        columns.join(", "),
        values.len()
    );
    if shape == UpdateShape::DeletionMarkers {
        sql.push_str(" AND deleted_at IS NULL");
    }

    Ok(conn.execute(&sql, params_from_iter(values))?)
}

/// Physical removal. Returns the number of removed rows.
pub(crate) fn delete_physical<T: Record>(conn: &Connection, id: RecordId) -> RepoResult<usize> {
    Ok(conn.execute(
        &format!("DELETE FROM {} WHERE id = ?1;", T::TABLE),
        [id.to_string()],
    )?)
}

/// Returns the SQLite message when `err` is a primary-key or unique-index
/// collision.
pub(crate) fn unique_violation_detail(err: &rusqlite::Error) -> Option<String> {
    match err {
        rusqlite::Error::SqliteFailure(failure, message)
            if failure.code == ErrorCode::ConstraintViolation
                && matches!(
                    failure.extended_code,
                    ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                ) =>
        {
            Some(message.clone().unwrap_or_else(|| failure.to_string()))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::{select_columns, unique_violation_detail};
    use crate::model::customer::Customer;

    #[test]
    fn select_columns_lists_meta_then_payload() {
        let columns = select_columns::<Customer>();
        assert!(columns.starts_with("id, created_by"));
        assert!(columns.ends_with("version, email, display_name, note"));
    }

    #[test]
    fn unique_violation_is_recognized() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (k TEXT PRIMARY KEY); INSERT INTO t VALUES ('a');")
            .unwrap();
        let err = conn
            .execute("INSERT INTO t VALUES ('a');", [])
            .unwrap_err();
        assert!(unique_violation_detail(&err).is_some());

        let other = conn.execute("INSERT INTO missing VALUES (1);", []).unwrap_err();
        assert!(unique_violation_detail(&other).is_none());
    }
}
