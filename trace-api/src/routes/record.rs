//! Traceability record endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde_json::json;
use uuid::Uuid;

use trace_core::types::{RecordId, TaskId};
use trace_db::services::{NewRecord, UpdateRecord};
use trace_db::store::RecordFilter;

use crate::auth::CurrentActor;
use crate::dto::{
    materials_from_dto, parse_record_state, parse_signature_kind, photo_from_dto,
    record_to_response, CreateRecordRequest, RecordQueryParams, RecordResponse, SignRequest,
    TransitionRequest, UpdateRecordRequest,
};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Open the traceability record for a task
pub async fn create_record(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Json(req): Json<CreateRecordRequest>,
) -> ApiResult<(StatusCode, Json<RecordResponse>)> {
    let record = state
        .records
        .create(
            NewRecord {
                task_id: TaskId(req.task_id),
                quantity_produced: req.quantity_produced,
                operator_code_for_lot: req.operator_code_for_lot,
                actual_operator_codes: req.actual_operator_codes,
                materials: materials_from_dto(req.materials)?,
                notes: req.notes,
            },
            &actor,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(record_to_response(&record))))
}

/// List records with optional filters
pub async fn list_records(
    State(state): State<AppState>,
    Query(params): Query<RecordQueryParams>,
) -> ApiResult<Json<Vec<RecordResponse>>> {
    let filter = RecordFilter {
        state: params
            .state
            .as_deref()
            .map(parse_record_state)
            .transpose()?,
        task_id: params.task_id.map(TaskId),
    };

    let records = state.records.list(&filter).await?;
    Ok(Json(records.iter().map(record_to_response).collect()))
}

/// Get one record
pub async fn get_record(
    State(state): State<AppState>,
    Path(record_id): Path<Uuid>,
) -> ApiResult<Json<RecordResponse>> {
    let record = state.records.get(&RecordId(record_id)).await?;
    Ok(Json(record_to_response(&record)))
}

/// Amend a record still under review
pub async fn update_record(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(record_id): Path<Uuid>,
    Json(req): Json<UpdateRecordRequest>,
) -> ApiResult<Json<RecordResponse>> {
    if req.state.is_some() {
        return Err(ApiError::Validation(
            "Disposition changes go through the transition endpoint".to_string(),
        ));
    }

    let record = state
        .records
        .update(
            &RecordId(record_id),
            UpdateRecord {
                quantity_produced: req.quantity_produced,
                operator_code_for_lot: req.operator_code_for_lot,
                day_of_year: req.day_of_year,
                actual_operator_codes: req.actual_operator_codes,
                materials: req.materials.map(materials_from_dto).transpose()?,
                notes: req.notes,
                label_photo: req.label_photo.map(photo_from_dto),
            },
            &actor,
        )
        .await?;

    Ok(Json(record_to_response(&record)))
}

/// Quality-control disposition change
pub async fn transition(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(record_id): Path<Uuid>,
    Json(req): Json<TransitionRequest>,
) -> ApiResult<Json<RecordResponse>> {
    let target = parse_record_state(&req.state)?;
    let record = state
        .records
        .transition(&RecordId(record_id), target, req.retention_reason, &actor)
        .await?;

    Ok(Json(record_to_response(&record)))
}

/// Add one sign-off
pub async fn sign(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(record_id): Path<Uuid>,
    Json(req): Json<SignRequest>,
) -> ApiResult<(StatusCode, Json<RecordResponse>)> {
    let kind = parse_signature_kind(&req.kind)?;
    let record = state
        .records
        .sign(&RecordId(record_id), kind, &actor)
        .await?;

    Ok((StatusCode::CREATED, Json(record_to_response(&record))))
}

/// Whether both sign-offs are present
pub async fn signatures_complete(
    State(state): State<AppState>,
    Path(record_id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    let complete = state
        .records
        .signatures_complete(&RecordId(record_id))
        .await?;
    Ok(Json(json!({ "complete": complete })))
}

/// Attach or replace the label photo reference
pub async fn attach_label_photo(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(record_id): Path<Uuid>,
    Json(req): Json<crate::dto::PhotoDto>,
) -> ApiResult<Json<RecordResponse>> {
    let record = state
        .records
        .attach_label_photo(&RecordId(record_id), photo_from_dto(req), &actor)
        .await?;

    Ok(Json(record_to_response(&record)))
}
