//! Failure reporting for job invocations.
//!
//! A failed invocation is offered, in order, to the job's own
//! [`Job::handle_error`], then to the process-wide [`ExceptionHandler`].
//! If neither claims it, it is logged and discarded.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error};

use crate::job::Job;
use crate::types::JobOrigin;

/// A job error wrapped with the identity of the job that raised it.
#[derive(Debug)]
pub struct JobFailure {
    pub job_name: String,
    pub origin: JobOrigin,
    pub error: anyhow::Error,
    pub occurred_at: DateTime<Utc>,
}

impl JobFailure {
    pub fn new(job_name: impl Into<String>, origin: JobOrigin, error: anyhow::Error) -> Self {
        Self {
            job_name: job_name.into(),
            origin,
            error,
            occurred_at: Utc::now(),
        }
    }

    /// Wrap a panic payload caught at the task boundary.
    pub fn from_panic(job_name: impl Into<String>, origin: JobOrigin, payload: Box<dyn Any + Send>) -> Self {
        let msg = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self::new(job_name, origin, anyhow::anyhow!("job panicked: {msg}"))
    }
}

impl fmt::Display for JobFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job '{}' ({}) failed: {:#}", self.job_name, self.origin, self.error)
    }
}

/// Process-wide sink for job failures.
pub trait ExceptionHandler: Send + Sync {
    /// Return `true` when the failure has been dealt with.
    fn handle(&self, failure: &JobFailure) -> bool;
}

/// Handles nothing; every failure falls through to the error log.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullExceptionHandler;

impl ExceptionHandler for NullExceptionHandler {
    fn handle(&self, _failure: &JobFailure) -> bool {
        false
    }
}

/// Several handlers tried in priority order; the first to return `true` wins.
#[derive(Default)]
pub struct ExceptionHandlerChain {
    /// Sorted by priority ascending after every insertion.
    handlers: Vec<(i32, Arc<dyn ExceptionHandler>)>,
}

impl ExceptionHandlerChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lower value = asked earlier. Ties keep insertion order.
    pub fn with(mut self, handler: Arc<dyn ExceptionHandler>, priority: i32) -> Self {
        self.handlers.push((priority, handler));
        self.handlers.sort_by_key(|(p, _)| *p);
        self
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl ExceptionHandler for ExceptionHandlerChain {
    fn handle(&self, failure: &JobFailure) -> bool {
        self.handlers.iter().any(|(_, h)| h.handle(failure))
    }
}

/// Walk the reporting chain for one failure.
pub(crate) fn report_failure(job: &dyn Job, global: &dyn ExceptionHandler, failure: JobFailure) {
    if job.handle_error(&failure) {
        debug!(job = %failure.job_name, origin = %failure.origin, "failure handled by job");
        return;
    }
    if global.handle(&failure) {
        debug!(job = %failure.job_name, origin = %failure.origin, "failure handled by exception handler");
        return;
    }
    let detail = format!("{:#}", failure.error);
    error!(
        job = %failure.job_name,
        origin = %failure.origin,
        error = %detail,
        "unhandled job failure"
    );
}
