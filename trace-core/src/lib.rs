//! Core domain model for the confectionery plant traceability backend.
//!
//! This crate owns the entities (catalog, production tasks, traceability
//! records), the lot-code / day-of-year derivation rules, and the domain
//! error taxonomy. It performs no I/O; persistence and HTTP live in
//! `trace-db` and `trace-api`.

pub mod error;
pub mod lot;
pub mod types;
pub mod validation;

pub use error::{TraceError, TraceResult};
