//! Task service: planning, start/finish guards and the blocked-check.

use chrono::Utc;
use std::sync::Arc;

use trace_core::types::{
    Actor, LineId, Role, ShiftId, Task, TaskId, TaskStatus,
};
use trace_core::{TraceError, TraceResult};

use crate::services::CatalogService;
use crate::store::{TaskFilter, TraceStore};

/// Request to plan a new production task
#[derive(Debug, Clone)]
pub struct NewTask {
    pub line_id: LineId,
    pub shift_id: ShiftId,
    pub product_code: String,
    pub scheduled_date: chrono::NaiveDate,
    pub production_goal: u32,
    pub notes: Option<String>,
    pub operator_codes: Vec<String>,
}

/// Request to amend a planned task
#[derive(Debug, Clone, Default)]
pub struct UpdateTask {
    pub production_goal: Option<u32>,
    pub notes: Option<String>,
    pub operator_codes: Option<Vec<String>>,
}

/// Whether a task may start, and what blocks it if not
#[derive(Debug, Clone)]
pub struct BlockStatus {
    pub blocked: bool,
    pub reason: Option<String>,
    pub blocking_task: Option<TaskId>,
}

/// Production task lifecycle
pub struct TaskService {
    store: Arc<dyn TraceStore>,
    catalog: Arc<CatalogService>,
}

impl TaskService {
    pub fn new(store: Arc<dyn TraceStore>, catalog: Arc<CatalogService>) -> Self {
        Self { store, catalog }
    }

    /// Plan a task. The acting supervisor becomes the task's assigner.
    pub async fn create(&self, input: NewTask, actor: &Actor) -> TraceResult<Task> {
        if actor.role != Role::Supervisor {
            return Err(TraceError::permission("Only supervisors can plan tasks"));
        }
        if input.production_goal < 1 {
            return Err(TraceError::validation("Production goal must be at least 1"));
        }

        let line = self
            .store
            .get_line(&input.line_id)
            .await?
            .ok_or_else(|| TraceError::not_found("Line", input.line_id.to_string()))?;
        if !line.active {
            return Err(TraceError::validation(format!(
                "Line {} is not operational",
                line.name
            )));
        }
        self.store
            .get_shift(&input.shift_id)
            .await?
            .ok_or_else(|| TraceError::not_found("Shift", input.shift_id.to_string()))?;
        self.store
            .get_product(&input.product_code)
            .await?
            .ok_or_else(|| TraceError::not_found("Product", input.product_code.clone()))?;

        let operators = self.catalog.resolve_operators(&input.operator_codes).await?;

        let task = Task {
            id: TaskId::new(),
            line_id: input.line_id,
            shift_id: input.shift_id,
            product_code: input.product_code,
            supervisor_id: actor.user_id,
            scheduled_date: input.scheduled_date,
            production_goal: input.production_goal,
            notes: input.notes,
            status: TaskStatus::Pending,
            assigned_operator_ids: operators.iter().map(|o| o.id).collect(),
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        };

        self.store.insert_task(&task).await?;
        tracing::info!(
            task_id = %task.id,
            line_id = %task.line_id,
            product = %task.product_code,
            date = %task.scheduled_date,
            "Task planned"
        );
        Ok(task)
    }

    /// Amend a task that has not finished. The nominal operator set is
    /// replaced wholesale when supplied.
    pub async fn update(&self, id: &TaskId, input: UpdateTask, actor: &Actor) -> TraceResult<Task> {
        if actor.role != Role::Supervisor {
            return Err(TraceError::permission("Only supervisors can amend tasks"));
        }

        let mut task = self.get(id).await?;
        if task.status == TaskStatus::Finished {
            return Err(TraceError::validation(
                "Finished tasks can no longer be amended",
            ));
        }

        if let Some(goal) = input.production_goal {
            if goal < 1 {
                return Err(TraceError::validation("Production goal must be at least 1"));
            }
            task.production_goal = goal;
        }
        if let Some(notes) = input.notes {
            task.notes = if notes.trim().is_empty() {
                None
            } else {
                Some(notes)
            };
        }
        if let Some(codes) = input.operator_codes {
            let operators = self.catalog.resolve_operators(&codes).await?;
            task.assigned_operator_ids = operators.iter().map(|o| o.id).collect();
        }

        self.store.update_task(&task).await?;
        Ok(task)
    }

    /// Remove a task that never ran
    pub async fn delete(&self, id: &TaskId, actor: &Actor) -> TraceResult<()> {
        if actor.role != Role::Supervisor {
            return Err(TraceError::permission("Only supervisors can delete tasks"));
        }
        let task = self.get(id).await?;
        if task.status != TaskStatus::Pending {
            return Err(TraceError::validation("Only pending tasks can be deleted"));
        }
        self.store.delete_task(id).await?;
        tracing::info!(task_id = %id, "Task deleted");
        Ok(())
    }

    pub async fn get(&self, id: &TaskId) -> TraceResult<Task> {
        self.store
            .get_task(id)
            .await?
            .ok_or_else(|| TraceError::not_found("Task", id.to_string()))
    }

    pub async fn list(&self, filter: &TaskFilter) -> TraceResult<Vec<Task>> {
        self.store.list_tasks(filter).await
    }

    /// Tasks planned for the current date
    pub async fn today(&self) -> TraceResult<Vec<Task>> {
        let filter = TaskFilter {
            date: Some(Utc::now().date_naive()),
            ..Default::default()
        };
        self.store.list_tasks(&filter).await
    }

    /// Start a pending task; the line-exclusivity check happens
    /// atomically in the store
    pub async fn start(&self, id: &TaskId) -> TraceResult<Task> {
        let task = self.store.start_task(id, Utc::now()).await?;
        tracing::info!(task_id = %id, line_id = %task.line_id, "Task started");
        Ok(task)
    }

    /// Finish an in-progress task
    pub async fn finish(&self, id: &TaskId) -> TraceResult<Task> {
        let task = self.store.finish_task(id, Utc::now()).await?;
        tracing::info!(
            task_id = %id,
            duration_minutes = task.duration_minutes(),
            "Task finished"
        );
        Ok(task)
    }

    /// Explain whether a task can start right now
    pub async fn check_blocked(&self, id: &TaskId) -> TraceResult<BlockStatus> {
        let task = self.get(id).await?;

        if let Some(running) = self.store.line_in_progress(&task.line_id).await? {
            if running.id != task.id {
                return Ok(BlockStatus {
                    blocked: true,
                    reason: Some("Another task is already in progress on this line".to_string()),
                    blocking_task: Some(running.id),
                });
            }
        }

        if task.status != TaskStatus::Pending {
            return Ok(BlockStatus {
                blocked: true,
                reason: Some(format!("Task is already {}", task.status.as_str())),
                blocking_task: None,
            });
        }

        Ok(BlockStatus {
            blocked: false,
            reason: None,
            blocking_task: None,
        })
    }
}
