//! Record-store schema steps.
//!
//! # Responsibility
//! - Keep the ordered list of schema steps for the record tables.
//! - Bring an opened database up to the newest schema this build knows.
//!
//! # Invariants
//! - Step versions start at 1 and increase by exactly one.
//! - `PRAGMA user_version` always equals the last step applied.
//! - Pending steps run in one transaction; a failing step applies nothing.

use crate::db::{DbError, DbResult};
use log::{debug, info};
use rusqlite::Connection;

struct SchemaStep {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

const SCHEMA_STEPS: &[SchemaStep] = &[
    SchemaStep {
        version: 1,
        name: "customers",
        sql: include_str!("0001_init.sql"),
    },
    SchemaStep {
        version: 2,
        name: "categories",
        sql: include_str!("0002_categories.sql"),
    },
];

/// Newest schema version this build can read and write.
pub fn supported_schema_version() -> u32 {
    SCHEMA_STEPS.last().map_or(0, |step| step.version)
}

/// Runs every step newer than the database's recorded version and returns
/// how many were applied.
pub fn migrate_schema(conn: &mut Connection) -> DbResult<usize> {
    let found = recorded_version(conn)?;
    let supported = supported_schema_version();
    if found > supported {
        return Err(DbError::SchemaTooNew { found, supported });
    }

    let pending: Vec<&SchemaStep> = SCHEMA_STEPS
        .iter()
        .filter(|step| step.version > found)
        .collect();
    if pending.is_empty() {
        return Ok(0);
    }

    let tx = conn.transaction()?;
    for step in &pending {
        tx.execute_batch(step.sql)?;
        tx.pragma_update(None, "user_version", step.version)?;
        debug!(
            "event=schema_step module=db status=ok version={} name={}",
            step.version, step.name
        );
    }
    tx.commit()?;

    info!(
        "event=db_migrate module=db status=ok from={found} to={supported} steps={}",
        pending.len()
    );
    Ok(pending.len())
}

fn recorded_version(conn: &Connection) -> DbResult<u32> {
    Ok(conn.pragma_query_value(None, "user_version", |row| row.get::<_, u32>(0))?)
}
