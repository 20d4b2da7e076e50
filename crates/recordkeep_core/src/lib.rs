//! Core persistence logic for recordkeep.
//!
//! Every write flows through the write interceptor, which stamps audit
//! metadata, enforces optimistic concurrency and turns deletes into soft
//! deletes before SQLite sees the row.

pub mod config;
pub mod db;
pub mod interceptor;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use config::{open_store, ConfigError, LoggingConfig, StoreConfig};
pub use interceptor::audit::{Clock, ContextProvider, OperationContext, SystemClock};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::category::Category;
pub use model::customer::Customer;
pub use model::record::{Record, RecordId, RecordMeta, RecordValidationError, Stamp};
pub use repo::{
    AsyncRecordRepository, Filter, FilterValue, RecordRepository, RepoError, RepoResult,
    SqliteRecordRepository, StoreContext, TransactionState,
};
pub use service::{RecordService, ReferenceCache, ReferenceData, ReferenceDataService};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
