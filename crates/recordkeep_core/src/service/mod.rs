//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository calls into use-case level APIs.
//! - Own cross-call concerns (transaction wrapping, reference-data caching)
//!   so the repository layer stays per-call.

pub mod record_service;
pub mod reference_cache;

pub use record_service::RecordService;
pub use reference_cache::{ReferenceCache, ReferenceData, ReferenceDataService, DEFAULT_CACHE_CAPACITY};
