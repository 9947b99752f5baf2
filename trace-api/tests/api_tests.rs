//! Integration tests for the traceability API endpoints
//!
//! These tests run the full router over an in-memory store and verify the
//! end-to-end plan -> start -> document -> review -> sign flow.

use axum::http::{HeaderName, HeaderValue};
use axum_test::TestServer;
use chrono::{Datelike, Utc};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use trace_api::{create_router, AppState};
use trace_core::types::{LineId, Product, ProductionLine, RawMaterial, Shift, ShiftId};
use trace_db::store::{MemoryStore, TraceStore};

struct TestApp {
    server: TestServer,
    line_id: Uuid,
    shift_id: Uuid,
}

/// Router over a seeded in-memory store
async fn create_test_app() -> TestApp {
    let store = Arc::new(MemoryStore::new());

    store
        .put_product(&Product {
            code: "410".to_string(),
            name: "alfajor manjar bitter".to_string(),
            description: None,
            active: true,
        })
        .await
        .unwrap();
    store
        .put_material(&RawMaterial {
            code: "CHO-70".to_string(),
            name: "bitter chocolate 70%".to_string(),
            unit: "kg".to_string(),
            lot_required: true,
            active: true,
        })
        .await
        .unwrap();

    let line = ProductionLine {
        id: LineId::new(),
        name: "Linea 1".to_string(),
        description: None,
        active: true,
    };
    let shift = Shift {
        id: ShiftId::new(),
        name: "AM".to_string(),
        starts_at: chrono::NaiveTime::from_hms_opt(6, 15, 0).unwrap(),
        ends_at: chrono::NaiveTime::from_hms_opt(13, 35, 0).unwrap(),
        active: true,
    };
    store.put_line(&line).await.unwrap();
    store.put_shift(&shift).await.unwrap();

    let state = AppState::new(store);
    let server = TestServer::new(create_router(state)).unwrap();

    TestApp {
        server,
        line_id: line.id.0,
        shift_id: shift.id.0,
    }
}

fn actor_headers(role: &str) -> [(HeaderName, HeaderValue); 2] {
    [
        (
            HeaderName::from_static("x-actor-id"),
            HeaderValue::from_str(&Uuid::new_v4().to_string()).unwrap(),
        ),
        (
            HeaderName::from_static("x-actor-role"),
            HeaderValue::from_static(match role {
                "supervisor" => "supervisor",
                _ => "quality_control",
            }),
        ),
    ]
}

async fn import_operators(app: &TestApp) {
    let [id, role] = actor_headers("supervisor");
    let response = app
        .server
        .post("/operators/import")
        .add_header(id.0, id.1)
        .add_header(role.0, role.1)
        .json(&json!({
            "operators": [
                { "code": "96", "first_name": "Juan", "last_name": "Perez" },
                { "code": "37", "first_name": "Maria", "last_name": "Gonzalez" }
            ]
        }))
        .await;
    response.assert_status_ok();
}

/// Plan a task and return its id
async fn plan_task(app: &TestApp) -> Uuid {
    let [id, role] = actor_headers("supervisor");
    let response = app
        .server
        .post("/tasks")
        .add_header(id.0, id.1)
        .add_header(role.0, role.1)
        .json(&json!({
            "line_id": app.line_id,
            "shift_id": app.shift_id,
            "product_code": "410",
            "scheduled_date": Utc::now().date_naive(),
            "production_goal": 1000,
            "operator_codes": ["96"]
        }))
        .await;
    response.assert_status(axum::http::StatusCode::CREATED);
    let body: serde_json::Value = response.json();
    body["id"].as_str().unwrap().parse().unwrap()
}

async fn start_task(app: &TestApp, task_id: Uuid) {
    let [id, role] = actor_headers("supervisor");
    let response = app
        .server
        .post(&format!("/tasks/{}/start", task_id))
        .add_header(id.0, id.1)
        .add_header(role.0, role.1)
        .await;
    response.assert_status_ok();
}

/// Open the record for a started task and return its id
async fn open_record(app: &TestApp, task_id: Uuid) -> Uuid {
    let [id, role] = actor_headers("supervisor");
    let response = app
        .server
        .post("/records")
        .add_header(id.0, id.1)
        .add_header(role.0, role.1)
        .json(&json!({
            "task_id": task_id,
            "quantity_produced": 1200,
            "operator_code_for_lot": "96",
            "actual_operator_codes": ["96", "37"],
            "materials": [
                {
                    "material_code": "CHO-70",
                    "lot": "L-2025-081",
                    "quantity": 45,
                    "rework": [
                        { "quantity": 3, "category": "tempering", "detail": null }
                    ],
                    "waste": []
                }
            ]
        }))
        .await;
    response.assert_status(axum::http::StatusCode::CREATED);
    let body: serde_json::Value = response.json();
    body["id"].as_str().unwrap().parse().unwrap()
}

// ============ Health Endpoint Tests ============

#[tokio::test]
async fn health_check() {
    let app = create_test_app().await;

    let response = app.server.get("/health").await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn ready_check() {
    let app = create_test_app().await;

    let response = app.server.get("/ready").await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["status"], "ready");
}

// ============ Auth Tests ============

#[tokio::test]
async fn missing_actor_headers_are_unauthorized() {
    let app = create_test_app().await;

    let response = app.server.post("/tasks").json(&json!({})).await;

    response.assert_status(axum::http::StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn quality_control_cannot_plan_tasks() {
    let app = create_test_app().await;
    import_operators(&app).await;

    let [id, role] = actor_headers("quality_control");
    let response = app
        .server
        .post("/tasks")
        .add_header(id.0, id.1)
        .add_header(role.0, role.1)
        .json(&json!({
            "line_id": app.line_id,
            "shift_id": app.shift_id,
            "product_code": "410",
            "scheduled_date": Utc::now().date_naive(),
            "production_goal": 1000,
            "operator_codes": ["96"]
        }))
        .await;

    response.assert_status(axum::http::StatusCode::FORBIDDEN);
}

// ============ Catalog Endpoint Tests ============

#[tokio::test]
async fn operator_import_reports_counts() {
    let app = create_test_app().await;

    let [id, role] = actor_headers("supervisor");
    let response = app
        .server
        .post("/operators/import")
        .add_header(id.0, id.1)
        .add_header(role.0, role.1)
        .json(&json!({
            "operators": [
                { "code": "96", "first_name": "Juan", "last_name": "Perez" }
            ]
        }))
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["created"], 1);
    assert_eq!(body["updated"], 0);

    let response = app.server.get("/operators").await;
    response.assert_status_ok();
    let operators: serde_json::Value = response.json();
    assert_eq!(operators.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn unknown_product_is_not_found() {
    let app = create_test_app().await;

    let response = app.server.get("/products/999").await;

    response.assert_status_not_found();
}

// ============ Task Endpoint Tests ============

#[tokio::test]
async fn duplicate_task_slot_conflicts() {
    let app = create_test_app().await;
    import_operators(&app).await;
    plan_task(&app).await;

    let [id, role] = actor_headers("supervisor");
    let response = app
        .server
        .post("/tasks")
        .add_header(id.0, id.1)
        .add_header(role.0, role.1)
        .json(&json!({
            "line_id": app.line_id,
            "shift_id": app.shift_id,
            "product_code": "410",
            "scheduled_date": Utc::now().date_naive(),
            "production_goal": 500,
            "operator_codes": ["96"]
        }))
        .await;

    response.assert_status(axum::http::StatusCode::CONFLICT);
}

#[tokio::test]
async fn today_lists_planned_tasks() {
    let app = create_test_app().await;
    import_operators(&app).await;
    let task_id = plan_task(&app).await;

    let response = app.server.get("/tasks/today").await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body[0]["id"], task_id.to_string());
    assert_eq!(body[0]["status"], "pending");
}

#[tokio::test]
async fn blocked_check_names_the_running_task() {
    let app = create_test_app().await;
    import_operators(&app).await;
    let first = plan_task(&app).await;
    start_task(&app, first).await;

    // Same line, next day
    let [id, role] = actor_headers("supervisor");
    let response = app
        .server
        .post("/tasks")
        .add_header(id.0, id.1)
        .add_header(role.0, role.1)
        .json(&json!({
            "line_id": app.line_id,
            "shift_id": app.shift_id,
            "product_code": "410",
            "scheduled_date": Utc::now().date_naive().succ_opt().unwrap(),
            "production_goal": 500,
            "operator_codes": ["96"]
        }))
        .await;
    response.assert_status(axum::http::StatusCode::CREATED);
    let second: serde_json::Value = response.json();

    let response = app
        .server
        .get(&format!("/tasks/{}/blocked", second["id"].as_str().unwrap()))
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["blocked"], true);
    assert_eq!(body["blocking_task"], first.to_string());
}

// ============ Record Endpoint Tests ============

#[tokio::test]
async fn record_flow_derives_lot_and_finishes_task() {
    let app = create_test_app().await;
    import_operators(&app).await;
    let task_id = plan_task(&app).await;
    start_task(&app, task_id).await;

    let record_id = open_record(&app, task_id).await;

    let response = app.server.get(&format!("/records/{}", record_id)).await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();

    let day = Utc::now().date_naive().ordinal();
    assert_eq!(body["lot_code"], format!("410-{}-96", day));
    assert_eq!(body["state"], "under_review");
    assert_eq!(body["signatures_complete"], false);
    assert_eq!(body["materials"][0]["unit"], "kg");

    let response = app.server.get(&format!("/tasks/{}", task_id)).await;
    let task: serde_json::Value = response.json();
    assert_eq!(task["status"], "finished");
}

#[tokio::test]
async fn second_record_for_a_task_conflicts() {
    let app = create_test_app().await;
    import_operators(&app).await;
    let task_id = plan_task(&app).await;
    start_task(&app, task_id).await;
    open_record(&app, task_id).await;

    let [id, role] = actor_headers("supervisor");
    let response = app
        .server
        .post("/records")
        .add_header(id.0, id.1)
        .add_header(role.0, role.1)
        .json(&json!({
            "task_id": task_id,
            "quantity_produced": 10,
            "operator_code_for_lot": "96",
            "actual_operator_codes": ["96"],
            "materials": []
        }))
        .await;

    response.assert_status(axum::http::StatusCode::CONFLICT);
}

#[tokio::test]
async fn day_of_year_cannot_change_on_update() {
    let app = create_test_app().await;
    import_operators(&app).await;
    let task_id = plan_task(&app).await;
    start_task(&app, task_id).await;
    let record_id = open_record(&app, task_id).await;

    let [id, role] = actor_headers("supervisor");
    let response = app
        .server
        .put(&format!("/records/{}", record_id))
        .add_header(id.0, id.1)
        .add_header(role.0, role.1)
        .json(&json!({ "day_of_year": 100 }))
        .await;

    response.assert_status(axum::http::StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn state_cannot_change_through_update() {
    let app = create_test_app().await;
    import_operators(&app).await;
    let task_id = plan_task(&app).await;
    start_task(&app, task_id).await;
    let record_id = open_record(&app, task_id).await;

    let [id, role] = actor_headers("supervisor");
    let response = app
        .server
        .put(&format!("/records/{}", record_id))
        .add_header(id.0, id.1)
        .add_header(role.0, role.1)
        .json(&json!({ "state": "released" }))
        .await;
    response.assert_status(axum::http::StatusCode::BAD_REQUEST);

    // The record is untouched
    let response = app.server.get(&format!("/records/{}", record_id)).await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["state"], "under_review");
}

#[tokio::test]
async fn transition_guards_role_and_reason() {
    let app = create_test_app().await;
    import_operators(&app).await;
    let task_id = plan_task(&app).await;
    start_task(&app, task_id).await;
    let record_id = open_record(&app, task_id).await;

    // Supervisor may not change disposition
    let [id, role] = actor_headers("supervisor");
    let response = app
        .server
        .post(&format!("/records/{}/transition", record_id))
        .add_header(id.0, id.1)
        .add_header(role.0, role.1)
        .json(&json!({ "state": "released" }))
        .await;
    response.assert_status(axum::http::StatusCode::FORBIDDEN);

    // Retention without a reason is rejected
    let [id, role] = actor_headers("quality_control");
    let response = app
        .server
        .post(&format!("/records/{}/transition", record_id))
        .add_header(id.0, id.1)
        .add_header(role.0, role.1)
        .json(&json!({ "state": "retained" }))
        .await;
    response.assert_status(axum::http::StatusCode::BAD_REQUEST);

    // Retain, then correct to released; the reason is cleared
    let [id, role] = actor_headers("quality_control");
    let response = app
        .server
        .post(&format!("/records/{}/transition", record_id))
        .add_header(id.0, id.1)
        .add_header(role.0, role.1)
        .json(&json!({ "state": "retained", "retention_reason": "metal detector alarm" }))
        .await;
    response.assert_status_ok();

    let [id, role] = actor_headers("quality_control");
    let response = app
        .server
        .post(&format!("/records/{}/transition", record_id))
        .add_header(id.0, id.1)
        .add_header(role.0, role.1)
        .json(&json!({ "state": "released" }))
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["state"], "released");
    assert!(body["retention_reason"].is_null());
}

#[tokio::test]
async fn dual_sign_off() {
    let app = create_test_app().await;
    import_operators(&app).await;
    let task_id = plan_task(&app).await;
    start_task(&app, task_id).await;
    let record_id = open_record(&app, task_id).await;

    // Role must match the signature kind
    let [id, role] = actor_headers("supervisor");
    let response = app
        .server
        .post(&format!("/records/{}/signatures", record_id))
        .add_header(id.0, id.1)
        .add_header(role.0, role.1)
        .json(&json!({ "kind": "quality_control" }))
        .await;
    response.assert_status(axum::http::StatusCode::FORBIDDEN);

    let [id, role] = actor_headers("supervisor");
    let response = app
        .server
        .post(&format!("/records/{}/signatures", record_id))
        .add_header(id.0, id.1)
        .add_header(role.0, role.1)
        .json(&json!({ "kind": "supervisor" }))
        .await;
    response.assert_status(axum::http::StatusCode::CREATED);

    // A second supervisor signature conflicts
    let [id, role] = actor_headers("supervisor");
    let response = app
        .server
        .post(&format!("/records/{}/signatures", record_id))
        .add_header(id.0, id.1)
        .add_header(role.0, role.1)
        .json(&json!({ "kind": "supervisor" }))
        .await;
    response.assert_status(axum::http::StatusCode::CONFLICT);

    let [id, role] = actor_headers("quality_control");
    let response = app
        .server
        .post(&format!("/records/{}/signatures", record_id))
        .add_header(id.0, id.1)
        .add_header(role.0, role.1)
        .json(&json!({ "kind": "quality_control" }))
        .await;
    response.assert_status(axum::http::StatusCode::CREATED);

    let response = app
        .server
        .get(&format!("/records/{}/signatures/complete", record_id))
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["complete"], true);
}

#[tokio::test]
async fn unknown_record_is_not_found() {
    let app = create_test_app().await;

    let response = app.server.get(&format!("/records/{}", Uuid::new_v4())).await;

    response.assert_status_not_found();
}
