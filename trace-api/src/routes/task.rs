//! Production task endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use trace_core::types::{LineId, ShiftId, TaskId, TaskStatus};
use trace_db::services::{NewTask, UpdateTask};
use trace_db::store::TaskFilter;

use crate::auth::CurrentActor;
use crate::dto::{
    task_to_response, BlockStatusResponse, CreateTaskRequest, TaskQueryParams, TaskResponse,
    UpdateTaskRequest,
};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Plan a new task
pub async fn create_task(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Json(req): Json<CreateTaskRequest>,
) -> ApiResult<(StatusCode, Json<TaskResponse>)> {
    let task = state
        .tasks
        .create(
            NewTask {
                line_id: LineId(req.line_id),
                shift_id: ShiftId(req.shift_id),
                product_code: req.product_code,
                scheduled_date: req.scheduled_date,
                production_goal: req.production_goal,
                notes: req.notes,
                operator_codes: req.operator_codes,
            },
            &actor,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(task_to_response(&task))))
}

/// List tasks with optional filters
pub async fn list_tasks(
    State(state): State<AppState>,
    Query(params): Query<TaskQueryParams>,
) -> ApiResult<Json<Vec<TaskResponse>>> {
    let filter = TaskFilter {
        date: params.date,
        line_id: params.line_id.map(LineId),
        shift_id: params.shift_id.map(ShiftId),
        status: params.status.as_deref().map(parse_task_status).transpose()?,
    };

    let tasks = state.tasks.list(&filter).await?;
    Ok(Json(tasks.iter().map(task_to_response).collect()))
}

/// Tasks planned for the current date
pub async fn today(State(state): State<AppState>) -> ApiResult<Json<Vec<TaskResponse>>> {
    let tasks = state.tasks.today().await?;
    Ok(Json(tasks.iter().map(task_to_response).collect()))
}

/// Get one task
pub async fn get_task(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
) -> ApiResult<Json<TaskResponse>> {
    let task = state.tasks.get(&TaskId(task_id)).await?;
    Ok(Json(task_to_response(&task)))
}

/// Amend a task that has not finished
pub async fn update_task(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(task_id): Path<Uuid>,
    Json(req): Json<UpdateTaskRequest>,
) -> ApiResult<Json<TaskResponse>> {
    let task = state
        .tasks
        .update(
            &TaskId(task_id),
            UpdateTask {
                production_goal: req.production_goal,
                notes: req.notes,
                operator_codes: req.operator_codes,
            },
            &actor,
        )
        .await?;

    Ok(Json(task_to_response(&task)))
}

/// Delete a pending task
pub async fn delete_task(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(task_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state.tasks.delete(&TaskId(task_id), &actor).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Start a pending task
pub async fn start_task(
    State(state): State<AppState>,
    CurrentActor(_actor): CurrentActor,
    Path(task_id): Path<Uuid>,
) -> ApiResult<Json<TaskResponse>> {
    let task = state.tasks.start(&TaskId(task_id)).await?;
    Ok(Json(task_to_response(&task)))
}

/// Finish an in-progress task
pub async fn finish_task(
    State(state): State<AppState>,
    CurrentActor(_actor): CurrentActor,
    Path(task_id): Path<Uuid>,
) -> ApiResult<Json<TaskResponse>> {
    let task = state.tasks.finish(&TaskId(task_id)).await?;
    Ok(Json(task_to_response(&task)))
}

/// Explain whether a task can start right now
pub async fn check_blocked(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
) -> ApiResult<Json<BlockStatusResponse>> {
    let status = state.tasks.check_blocked(&TaskId(task_id)).await?;
    Ok(Json(BlockStatusResponse {
        blocked: status.blocked,
        reason: status.reason,
        blocking_task: status.blocking_task.map(|id| id.0),
    }))
}

fn parse_task_status(s: &str) -> Result<TaskStatus, ApiError> {
    match s {
        "pending" => Ok(TaskStatus::Pending),
        "in_progress" => Ok(TaskStatus::InProgress),
        "finished" => Ok(TaskStatus::Finished),
        other => Err(ApiError::Validation(format!(
            "Unknown task status: {}",
            other
        ))),
    }
}
