//! Domain types

pub mod catalog;
pub mod common;
pub mod record;
pub mod task;

pub use catalog::{Operator, Product, ProductionLine, RawMaterial, RecipeLine, Shift};
pub use common::{Actor, LineId, OperatorId, RecordId, Role, ShiftId, TaskId, UserId};
pub use record::{
    Cause, CauseEntry, MaterialUsage, PhotoRef, RecordState, Signature, SignatureKind,
    TraceabilityRecord,
};
pub use task::{Task, TaskStatus};
