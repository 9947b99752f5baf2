//! Traceability API server
//!
//! REST surface over the plant MES traceability backend.
//!
//! ## Endpoints
//!
//! ### Catalog
//! - GET /products - List active products
//! - GET /products/:code - Get product with recipe
//! - GET /materials - List active raw materials
//! - GET /lines - List active production lines
//! - GET /shifts - List active shifts
//! - GET /operators - List active operators
//! - POST /operators/import - Bulk operator upsert
//!
//! ### Production tasks
//! - POST /tasks - Plan a task
//! - GET /tasks - List tasks (date/line/shift/status filters)
//! - GET /tasks/today - Tasks planned for today
//! - GET /tasks/:task_id - Get task
//! - PUT /tasks/:task_id - Amend task
//! - DELETE /tasks/:task_id - Delete pending task
//! - POST /tasks/:task_id/start - Start task
//! - POST /tasks/:task_id/finish - Finish task
//! - GET /tasks/:task_id/blocked - Blocked-check
//!
//! ### Traceability records
//! - POST /records - Open record for a task
//! - GET /records - List records (state/task filters)
//! - GET /records/:record_id - Get record
//! - PUT /records/:record_id - Amend record under review
//! - POST /records/:record_id/transition - Disposition change
//! - POST /records/:record_id/signatures - Sign-off
//! - GET /records/:record_id/signatures/complete - Dual sign-off check
//! - POST /records/:record_id/label-photo - Attach label photo
//!
//! The acting user arrives via the trusted `x-actor-id` and
//! `x-actor-role` headers; authentication itself lives in the upstream
//! gateway.

pub mod auth;
pub mod dto;
pub mod error;
pub mod routes;
pub mod server;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use server::{create_server, run_server, start_background_server};
pub use state::{ApiConfig, AppState};
