//! Production tasks.
//!
//! A task is a planned production run of one product on one line during
//! one shift. Its timeline runs pending -> in_progress -> finished; only
//! one task may be in progress on a given line at a time.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::common::{LineId, OperatorId, ShiftId, TaskId, UserId};
use crate::error::{TraceError, TraceResult};

/// Task lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Finished,
}

impl TaskStatus {
    /// Stable wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Finished => "finished",
        }
    }
}

/// A planned production run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub line_id: LineId,
    pub shift_id: ShiftId,
    pub product_code: String,
    /// Supervisor who planned the task
    pub supervisor_id: UserId,
    pub scheduled_date: NaiveDate,
    /// Production goal in units, >= 1
    pub production_goal: u32,
    pub notes: Option<String>,
    pub status: TaskStatus,
    /// Workers nominally assigned when the task was planned. The
    /// traceability record keeps its own list of who actually worked.
    pub assigned_operator_ids: Vec<OperatorId>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Whether the task can still be started
    pub fn can_start(&self) -> bool {
        self.status == TaskStatus::Pending
    }

    /// Mark the task as started
    pub fn start(&mut self, at: DateTime<Utc>) -> TraceResult<()> {
        if self.status != TaskStatus::Pending {
            return Err(TraceError::validation(format!(
                "Only pending tasks can be started (task {} is {})",
                self.id,
                self.status.as_str()
            )));
        }
        self.status = TaskStatus::InProgress;
        self.started_at = Some(at);
        Ok(())
    }

    /// Mark the task as finished
    pub fn finish(&mut self, at: DateTime<Utc>) -> TraceResult<()> {
        if self.status != TaskStatus::InProgress {
            return Err(TraceError::validation(format!(
                "Only in-progress tasks can be finished (task {} is {})",
                self.id,
                self.status.as_str()
            )));
        }
        self.status = TaskStatus::Finished;
        self.finished_at = Some(at);
        Ok(())
    }

    /// Run duration, available once the task has both timestamps
    pub fn duration_minutes(&self) -> Option<i64> {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => Some((end - start).num_minutes()),
            _ => None,
        }
    }
}
