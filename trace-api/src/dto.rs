//! Data transfer objects for API requests and responses

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use trace_core::types::{
    Cause, PhotoRef, Product, RawMaterial, RecordState, SignatureKind, Task, TraceabilityRecord,
};
use trace_db::services::{NewCauseEntry, NewMaterialUsage};

use crate::error::ApiError;

// ============ Health DTOs ============

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

// ============ Catalog DTOs ============

/// One row of an operator import payload
#[derive(Debug, Deserialize)]
pub struct OperatorRowDto {
    pub code: String,
    pub first_name: String,
    pub last_name: String,
}

#[derive(Debug, Deserialize)]
pub struct ImportOperatorsRequest {
    pub operators: Vec<OperatorRowDto>,
}

#[derive(Debug, Serialize)]
pub struct ImportSummaryResponse {
    pub created: usize,
    pub updated: usize,
}

/// A product with the materials its recipe expects, in form order
#[derive(Debug, Serialize)]
pub struct ProductWithRecipeResponse {
    pub product: Product,
    pub materials: Vec<RawMaterial>,
}

// ============ Task DTOs ============

#[derive(Debug, Deserialize)]
pub struct CreateTaskRequest {
    pub line_id: Uuid,
    pub shift_id: Uuid,
    pub product_code: String,
    pub scheduled_date: NaiveDate,
    pub production_goal: u32,
    pub notes: Option<String>,
    #[serde(default)]
    pub operator_codes: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTaskRequest {
    pub production_goal: Option<u32>,
    pub notes: Option<String>,
    pub operator_codes: Option<Vec<String>>,
}

/// Task listing filters
#[derive(Debug, Deserialize)]
pub struct TaskQueryParams {
    pub date: Option<NaiveDate>,
    pub line_id: Option<Uuid>,
    pub shift_id: Option<Uuid>,
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TaskResponse {
    pub id: Uuid,
    pub line_id: Uuid,
    pub shift_id: Uuid,
    pub product_code: String,
    pub supervisor_id: Uuid,
    pub scheduled_date: NaiveDate,
    pub production_goal: u32,
    pub notes: Option<String>,
    pub status: String,
    pub assigned_operator_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_minutes: Option<i64>,
}

pub fn task_to_response(task: &Task) -> TaskResponse {
    TaskResponse {
        id: task.id.0,
        line_id: task.line_id.0,
        shift_id: task.shift_id.0,
        product_code: task.product_code.clone(),
        supervisor_id: task.supervisor_id.0,
        scheduled_date: task.scheduled_date,
        production_goal: task.production_goal,
        notes: task.notes.clone(),
        status: task.status.as_str().to_string(),
        assigned_operator_ids: task.assigned_operator_ids.iter().map(|id| id.0).collect(),
        created_at: task.created_at,
        started_at: task.started_at,
        finished_at: task.finished_at,
        duration_minutes: task.duration_minutes(),
    }
}

#[derive(Debug, Serialize)]
pub struct BlockStatusResponse {
    pub blocked: bool,
    pub reason: Option<String>,
    pub blocking_task: Option<Uuid>,
}

// ============ Record DTOs ============

/// Rework or waste line: `category` names the cause, `detail` carries the
/// free text that an `other` cause requires
#[derive(Debug, Serialize, Deserialize)]
pub struct CauseEntryDto {
    pub quantity: u32,
    pub category: String,
    pub detail: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MaterialUsageDto {
    pub material_code: String,
    pub lot: Option<String>,
    pub quantity: u32,
    pub unit: Option<String>,
    #[serde(default)]
    pub rework: Vec<CauseEntryDto>,
    #[serde(default)]
    pub waste: Vec<CauseEntryDto>,
}

#[derive(Debug, Deserialize)]
pub struct PhotoDto {
    pub url: String,
    pub content_type: Option<String>,
    pub size_bytes: u64,
}

#[derive(Debug, Deserialize)]
pub struct CreateRecordRequest {
    pub task_id: Uuid,
    pub quantity_produced: u32,
    pub operator_code_for_lot: String,
    #[serde(default)]
    pub actual_operator_codes: Vec<String>,
    #[serde(default)]
    pub materials: Vec<MaterialUsageDto>,
    pub notes: Option<String>,
}

/// Amendment payload. `day_of_year` and `state` are accepted by the
/// deserializer only so the handler can reject them with a clear error;
/// the day segment is fixed at creation and disposition changes go
/// through the transition endpoint.
#[derive(Debug, Deserialize)]
pub struct UpdateRecordRequest {
    pub quantity_produced: Option<u32>,
    pub operator_code_for_lot: Option<String>,
    pub day_of_year: Option<u16>,
    pub state: Option<String>,
    pub actual_operator_codes: Option<Vec<String>>,
    pub materials: Option<Vec<MaterialUsageDto>>,
    pub notes: Option<String>,
    pub label_photo: Option<PhotoDto>,
}

#[derive(Debug, Deserialize)]
pub struct TransitionRequest {
    pub state: String,
    pub retention_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SignRequest {
    pub kind: String,
}

/// Record listing filters
#[derive(Debug, Deserialize)]
pub struct RecordQueryParams {
    pub state: Option<String>,
    pub task_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct MaterialUsageResponse {
    pub material_code: String,
    pub lot: Option<String>,
    pub quantity: u32,
    pub unit: String,
    pub rework: Vec<CauseEntryDto>,
    pub waste: Vec<CauseEntryDto>,
}

#[derive(Debug, Serialize)]
pub struct SignatureResponse {
    pub kind: String,
    pub user_id: Uuid,
    pub signed_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct PhotoResponse {
    pub url: String,
    pub content_type: Option<String>,
    pub size_bytes: u64,
}

#[derive(Debug, Serialize)]
pub struct RecordResponse {
    pub id: Uuid,
    pub task_id: Uuid,
    pub product_code: String,
    pub quantity_produced: u32,
    pub day_of_year: u16,
    pub lot_code: String,
    pub state: String,
    pub retention_reason: Option<String>,
    pub label_photo: Option<PhotoResponse>,
    pub materials: Vec<MaterialUsageResponse>,
    pub actual_operator_ids: Vec<Uuid>,
    pub signatures: Vec<SignatureResponse>,
    pub signatures_complete: bool,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub fn record_to_response(record: &TraceabilityRecord) -> RecordResponse {
    RecordResponse {
        id: record.id.0,
        task_id: record.task_id.0,
        product_code: record.product_code.clone(),
        quantity_produced: record.quantity_produced,
        day_of_year: record.day_of_year,
        lot_code: record.lot_code.clone(),
        state: record.state.as_str().to_string(),
        retention_reason: record.retention_reason.clone(),
        label_photo: record.label_photo.as_ref().map(|p| PhotoResponse {
            url: p.url.clone(),
            content_type: p.content_type.clone(),
            size_bytes: p.size_bytes,
        }),
        materials: record
            .materials
            .iter()
            .map(|usage| MaterialUsageResponse {
                material_code: usage.material_code.clone(),
                lot: usage.lot.clone(),
                quantity: usage.quantity,
                unit: usage.unit.clone(),
                rework: usage.rework.iter().map(cause_entry_to_dto).collect(),
                waste: usage.waste.iter().map(cause_entry_to_dto).collect(),
            })
            .collect(),
        actual_operator_ids: record.actual_operator_ids.iter().map(|id| id.0).collect(),
        signatures: record
            .signatures
            .iter()
            .map(|s| SignatureResponse {
                kind: s.kind.as_str().to_string(),
                user_id: s.user_id.0,
                signed_at: s.signed_at,
            })
            .collect(),
        signatures_complete: record.signatures_complete(),
        notes: record.notes.clone(),
        created_at: record.created_at,
        updated_at: record.updated_at,
    }
}

// ============ Parse helpers ============

pub fn parse_record_state(s: &str) -> Result<RecordState, ApiError> {
    match s {
        "under_review" => Ok(RecordState::UnderReview),
        "released" => Ok(RecordState::Released),
        "retained" => Ok(RecordState::Retained),
        other => Err(ApiError::Validation(format!(
            "Unknown record state: {}",
            other
        ))),
    }
}

pub fn parse_signature_kind(s: &str) -> Result<SignatureKind, ApiError> {
    match s {
        "supervisor" => Ok(SignatureKind::Supervisor),
        "quality_control" => Ok(SignatureKind::QualityControl),
        other => Err(ApiError::Validation(format!(
            "Unknown signature kind: {}",
            other
        ))),
    }
}

fn parse_cause(category: &str, detail: Option<String>) -> Result<Cause, ApiError> {
    match category {
        "breakage" => Ok(Cause::Breakage),
        "sealing" => Ok(Cause::Sealing),
        "tempering" => Ok(Cause::Tempering),
        "labeling" => Ok(Cause::Labeling),
        "expiry" => Ok(Cause::Expiry),
        "other" => match detail {
            Some(text) if !text.trim().is_empty() => Ok(Cause::Other(text)),
            _ => Err(ApiError::Validation(
                "An 'other' cause needs a detail text".to_string(),
            )),
        },
        unknown => Err(ApiError::Validation(format!(
            "Unknown cause category: {}",
            unknown
        ))),
    }
}

fn cause_entry_to_dto(entry: &trace_core::types::CauseEntry) -> CauseEntryDto {
    let (category, detail) = match &entry.cause {
        Cause::Breakage => ("breakage", None),
        Cause::Sealing => ("sealing", None),
        Cause::Tempering => ("tempering", None),
        Cause::Labeling => ("labeling", None),
        Cause::Expiry => ("expiry", None),
        Cause::Other(text) => ("other", Some(text.clone())),
    };
    CauseEntryDto {
        quantity: entry.quantity,
        category: category.to_string(),
        detail,
    }
}

fn cause_entry_from_dto(dto: CauseEntryDto) -> Result<NewCauseEntry, ApiError> {
    Ok(NewCauseEntry {
        quantity: dto.quantity,
        cause: parse_cause(&dto.category, dto.detail)?,
    })
}

pub fn materials_from_dto(dtos: Vec<MaterialUsageDto>) -> Result<Vec<NewMaterialUsage>, ApiError> {
    dtos.into_iter()
        .map(|dto| {
            Ok(NewMaterialUsage {
                material_code: dto.material_code,
                lot: dto.lot,
                quantity: dto.quantity,
                unit: dto.unit,
                rework: dto
                    .rework
                    .into_iter()
                    .map(cause_entry_from_dto)
                    .collect::<Result<_, _>>()?,
                waste: dto
                    .waste
                    .into_iter()
                    .map(cause_entry_from_dto)
                    .collect::<Result<_, _>>()?,
            })
        })
        .collect()
}

pub fn photo_from_dto(dto: PhotoDto) -> PhotoRef {
    PhotoRef {
        url: dto.url,
        content_type: dto.content_type,
        size_bytes: dto.size_bytes,
    }
}
