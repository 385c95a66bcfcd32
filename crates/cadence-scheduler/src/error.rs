use thiserror::Error;

/// Errors raised synchronously by the scheduler: trigger construction and
/// registry management. Job failures never surface here.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The trigger parameters are invalid (negative interval, zero repeat
    /// count, inverted validity window).
    #[error("Invalid trigger: {0}")]
    InvalidTrigger(String),

    /// A cron expression failed to parse.
    #[error("Invalid cron expression '{expression}': {reason}")]
    InvalidCron { expression: String, reason: String },

    /// No scheduled task with the given ID exists in the pool.
    #[error("Task not found: {id}")]
    TaskNotFound { id: String },

    #[error(transparent)]
    Core(#[from] cadence_core::CadenceError),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;

/// Outcome of a single job invocation.
#[derive(Debug, Error)]
pub enum JobError {
    /// The job observed its cancellation signal and stopped early.
    /// Expected flow, never reported as a failure.
    #[error("Job cancelled")]
    Cancelled,

    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

impl JobError {
    pub fn failed(msg: impl std::fmt::Display) -> Self {
        JobError::Failed(anyhow::anyhow!("{msg}"))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, JobError::Cancelled)
    }
}
