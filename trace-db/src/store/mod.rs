//! Storage abstraction.
//!
//! Uniqueness rules that must hold under concurrent requests live here,
//! not in application-level read-then-write checks:
//! - one task per (line, shift, date, product),
//! - one in-progress task per line,
//! - one traceability record per task,
//! - one signature per (record, kind).
//!
//! Backends surface violations as [`TraceError::Conflict`].

pub mod memory;
pub mod sled;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use trace_core::types::{
    LineId, Operator, Product, ProductionLine, RawMaterial, RecipeLine, RecordId, RecordState,
    Shift, ShiftId, Signature, Task, TaskId, TaskStatus, TraceabilityRecord,
};
use trace_core::TraceResult;

/// Optional filters for task listings
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub date: Option<NaiveDate>,
    pub line_id: Option<LineId>,
    pub shift_id: Option<ShiftId>,
    pub status: Option<TaskStatus>,
}

/// Optional filters for record listings
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    pub state: Option<RecordState>,
    pub task_id: Option<TaskId>,
}

/// Persistence interface for the traceability domain
#[async_trait]
pub trait TraceStore: Send + Sync {
    // ==================== Catalog ====================

    async fn put_product(&self, product: &Product) -> TraceResult<()>;
    async fn get_product(&self, code: &str) -> TraceResult<Option<Product>>;
    async fn list_products(&self) -> TraceResult<Vec<Product>>;

    async fn put_material(&self, material: &RawMaterial) -> TraceResult<()>;
    async fn get_material(&self, code: &str) -> TraceResult<Option<RawMaterial>>;
    async fn list_materials(&self) -> TraceResult<Vec<RawMaterial>>;

    async fn put_recipe_line(&self, line: &RecipeLine) -> TraceResult<()>;
    async fn list_recipe(&self, product_code: &str) -> TraceResult<Vec<RecipeLine>>;

    async fn put_operator(&self, operator: &Operator) -> TraceResult<()>;
    async fn get_operator(&self, code: &str) -> TraceResult<Option<Operator>>;
    async fn list_operators(&self) -> TraceResult<Vec<Operator>>;

    async fn put_line(&self, line: &ProductionLine) -> TraceResult<()>;
    async fn get_line(&self, id: &LineId) -> TraceResult<Option<ProductionLine>>;
    async fn list_lines(&self) -> TraceResult<Vec<ProductionLine>>;

    async fn put_shift(&self, shift: &Shift) -> TraceResult<()>;
    async fn get_shift(&self, id: &ShiftId) -> TraceResult<Option<Shift>>;
    async fn list_shifts(&self) -> TraceResult<Vec<Shift>>;

    // ==================== Tasks ====================

    /// Insert a new task; conflicts when another task already occupies
    /// the same (line, shift, date, product) slot
    async fn insert_task(&self, task: &Task) -> TraceResult<()>;

    /// Replace an existing task, keeping the uniqueness index consistent
    async fn update_task(&self, task: &Task) -> TraceResult<()>;

    async fn delete_task(&self, id: &TaskId) -> TraceResult<()>;
    async fn get_task(&self, id: &TaskId) -> TraceResult<Option<Task>>;
    async fn list_tasks(&self, filter: &TaskFilter) -> TraceResult<Vec<Task>>;

    /// Atomically start a pending task; conflicts when another task is
    /// already in progress on the same line
    async fn start_task(&self, id: &TaskId, at: DateTime<Utc>) -> TraceResult<Task>;

    /// Atomically finish an in-progress task
    async fn finish_task(&self, id: &TaskId, at: DateTime<Utc>) -> TraceResult<Task>;

    /// The task currently in progress on a line, if any
    async fn line_in_progress(&self, line_id: &LineId) -> TraceResult<Option<Task>>;

    // ==================== Traceability records ====================

    /// Insert a record together with its (possibly just-finished) owning
    /// task, atomically; conflicts when the task already has a record
    async fn insert_record(&self, record: &TraceabilityRecord, task: &Task) -> TraceResult<()>;

    /// Replace the whole record aggregate (materials, workers, photo,
    /// state), conditional on the stored aggregate still carrying
    /// `expected_updated_at`; conflicts when another writer (such as a
    /// signature append) got there first
    async fn replace_record(
        &self,
        record: &TraceabilityRecord,
        expected_updated_at: DateTime<Utc>,
    ) -> TraceResult<()>;

    /// Atomically append a signature; conflicts when a signature of the
    /// same kind already exists on the record
    async fn append_signature(
        &self,
        id: &RecordId,
        signature: Signature,
    ) -> TraceResult<TraceabilityRecord>;

    async fn get_record(&self, id: &RecordId) -> TraceResult<Option<TraceabilityRecord>>;
    async fn get_record_by_task(&self, task_id: &TaskId)
        -> TraceResult<Option<TraceabilityRecord>>;
    async fn list_records(&self, filter: &RecordFilter) -> TraceResult<Vec<TraceabilityRecord>>;
}

impl TaskFilter {
    pub(crate) fn matches(&self, task: &Task) -> bool {
        self.date.map_or(true, |d| task.scheduled_date == d)
            && self.line_id.map_or(true, |l| task.line_id == l)
            && self.shift_id.map_or(true, |s| task.shift_id == s)
            && self.status.map_or(true, |s| task.status == s)
    }
}

impl RecordFilter {
    pub(crate) fn matches(&self, record: &TraceabilityRecord) -> bool {
        self.state.map_or(true, |s| record.state == s)
            && self.task_id.map_or(true, |t| record.task_id == t)
    }
}

pub use memory::MemoryStore;
pub use self::sled::SledStore;
