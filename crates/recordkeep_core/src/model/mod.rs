//! Record domain model.
//!
//! # Responsibility
//! - Define the metadata every persisted record carries.
//! - Provide the concrete record types shipped with the store.
//!
//! # Invariants
//! - Every record is identified by a stable `RecordId`.
//! - Deletion is represented by a deleted stamp, not physical removal.

pub mod category;
pub mod customer;
pub mod record;
