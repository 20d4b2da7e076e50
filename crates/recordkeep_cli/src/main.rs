//! CLI smoke entry point.
//!
//! # Responsibility
//! - Provide a minimal executable to verify `recordkeep_core` linkage.
//! - Drive one record through add, update and delete against an in-memory
//!   store and print the stamped metadata.
//! - Keep output deterministic apart from ids and timestamps.

use recordkeep_core::{
    open_store, Customer, Filter, RecordRepository, SqliteRecordRepository, StoreConfig,
};
use std::error::Error;
use std::process::ExitCode;

fn main() -> ExitCode {
    println!("recordkeep_core ping={}", recordkeep_core::ping());
    println!("recordkeep_core version={}", recordkeep_core::core_version());

    match run_probe() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("recordkeep probe failed: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run_probe() -> Result<(), Box<dyn Error>> {
    let config = StoreConfig::in_memory().with_env_overrides()?;
    let context = open_store(&config)?;
    let customers = SqliteRecordRepository::<Customer>::new(context);

    let added = customers.add(Customer::new("probe@example.com", "Probe"))?;
    println!("added id={} version={}", added.meta.id, added.meta.version);

    let mut edited = added.clone();
    edited.display_name = "Probe (edited)".to_string();
    let updated = customers.update(edited)?;
    println!("updated version={}", updated.meta.version);

    let deleted = customers.delete(updated)?;
    let live = customers.find(&Filter::id(deleted.meta.id))?;
    println!(
        "deleted live={} deleted_by={}",
        live.is_some(),
        deleted
            .meta
            .deleted
            .as_ref()
            .map_or("-", |stamp| stamp.actor_id.as_str())
    );
    Ok(())
}
