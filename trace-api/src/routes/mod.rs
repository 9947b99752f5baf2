//! API route handlers

pub mod catalog;
pub mod health;
pub mod record;
pub mod task;

use axum::{
    routing::{get, post},
    Router,
};

use crate::state::AppState;

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health endpoints
        .route("/health", get(health::health_check))
        .route("/ready", get(health::ready_check))
        // Catalog endpoints
        .route("/products", get(catalog::list_products))
        .route("/products/:code", get(catalog::get_product))
        .route("/materials", get(catalog::list_materials))
        .route("/lines", get(catalog::list_lines))
        .route("/shifts", get(catalog::list_shifts))
        .route("/operators", get(catalog::list_operators))
        .route("/operators/import", post(catalog::import_operators))
        // Task endpoints
        .route("/tasks", post(task::create_task).get(task::list_tasks))
        .route("/tasks/today", get(task::today))
        .route(
            "/tasks/:task_id",
            get(task::get_task)
                .put(task::update_task)
                .delete(task::delete_task),
        )
        .route("/tasks/:task_id/start", post(task::start_task))
        .route("/tasks/:task_id/finish", post(task::finish_task))
        .route("/tasks/:task_id/blocked", get(task::check_blocked))
        // Traceability record endpoints
        .route(
            "/records",
            post(record::create_record).get(record::list_records),
        )
        .route(
            "/records/:record_id",
            get(record::get_record).put(record::update_record),
        )
        .route("/records/:record_id/transition", post(record::transition))
        .route("/records/:record_id/signatures", post(record::sign))
        .route(
            "/records/:record_id/signatures/complete",
            get(record::signatures_complete),
        )
        .route(
            "/records/:record_id/label-photo",
            post(record::attach_label_photo),
        )
        // State
        .with_state(state)
}
