use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of a scheduled (recurring) task.
///
/// UUIDv7 so IDs sort by registration time in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a job invocation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobOrigin {
    /// Fired by the scheduled loop for the given task.
    Scheduled { task_id: TaskId },
    /// Dequeued by a queue consumer.
    Queued,
}

impl fmt::Display for JobOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobOrigin::Scheduled { task_id } => write!(f, "scheduled:{task_id}"),
            JobOrigin::Queued => write!(f, "queued"),
        }
    }
}

/// Timing metadata handed to a recurring job for one firing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FireTimes {
    /// Execution count including this run (first run is 1).
    pub execution_count: u64,
    /// The fire time this run was triggered for.
    pub scheduled_at: DateTime<Utc>,
    /// The tick instant the run actually started at.
    pub started_at: DateTime<Utc>,
    /// Start of the previous run, if any.
    pub previous_run: Option<DateTime<Utc>>,
    /// Predicted next fire time; `None` when the trigger is exhausted.
    pub next_fire: Option<DateTime<Utc>>,
}

impl FireTimes {
    /// How late this run started relative to its scheduled fire time.
    pub fn drift(&self) -> chrono::Duration {
        self.started_at - self.scheduled_at
    }
}

/// Read-only view of a scheduled task, for status reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub id: TaskId,
    pub name: String,
    pub registered_at: DateTime<Utc>,
    pub total_execution_count: u64,
    pub last_known_execution_time: Option<DateTime<Utc>>,
    pub next_possible_fire_time: Option<DateTime<Utc>>,
}
