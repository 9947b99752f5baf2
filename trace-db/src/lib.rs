//! Storage and service layer for the traceability backend.
//!
//! The [`store::TraceStore`] trait abstracts persistence; a memory
//! backend serves tests and development, a sled backend serves
//! deployments. The services on top enforce the domain invariants
//! (task exclusivity per line, one record per task, dual sign-off
//! uniqueness) and are what the API layer talks to.

pub mod services;
pub mod store;

pub use services::{CatalogService, RecordService, TaskService};
pub use store::{MemoryStore, SledStore, TraceStore};
