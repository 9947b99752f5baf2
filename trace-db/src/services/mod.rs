//! Domain services.
//!
//! Services validate requests against the catalog, derive lot codes,
//! apply state-machine guards and delegate the uniqueness-sensitive
//! writes to the store.

pub mod catalog_service;
pub mod record_service;
pub mod task_service;

pub use catalog_service::{CatalogService, ImportSummary, OperatorImportRow, ProductWithRecipe};
pub use record_service::{
    NewCauseEntry, NewMaterialUsage, NewRecord, RecordService, UpdateRecord,
};
pub use task_service::{BlockStatus, NewTask, TaskService, UpdateTask};
