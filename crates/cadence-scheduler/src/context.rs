use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::error::JobError;
use crate::scope::Scope;
use crate::types::{FireTimes, JobOrigin};

/// Everything a job body gets for one invocation.
///
/// Built by the execution loop right before the call and dropped right
/// after it; cloning is cheap (tokens and the scope are reference-counted).
#[derive(Debug, Clone)]
pub struct JobContext {
    shutdown: CancellationToken,
    job_cancel: Option<CancellationToken>,
    scope: Arc<Scope>,
    origin: JobOrigin,
    fire_times: Option<FireTimes>,
}

impl JobContext {
    pub(crate) fn new(
        shutdown: CancellationToken,
        job_cancel: Option<CancellationToken>,
        scope: Arc<Scope>,
        origin: JobOrigin,
        fire_times: Option<FireTimes>,
    ) -> Self {
        Self {
            shutdown,
            job_cancel,
            scope,
            origin,
            fire_times,
        }
    }

    /// True once either the host is shutting down or this job's own token fired.
    pub fn is_cancelled(&self) -> bool {
        self.shutdown.is_cancelled() || self.job_cancel.as_ref().is_some_and(|t| t.is_cancelled())
    }

    /// Resolves when the derived cancellation signal fires.
    pub async fn cancelled(&self) {
        match &self.job_cancel {
            Some(job) => {
                tokio::select! {
                    () = self.shutdown.cancelled() => {}
                    () = job.cancelled() => {}
                }
            }
            None => self.shutdown.cancelled().await,
        }
    }

    /// `Err(JobError::Cancelled)` once cancellation was requested, so long
    /// running bodies can bail out with `ctx.checkpoint()?`.
    pub fn checkpoint(&self) -> Result<(), JobError> {
        if self.is_cancelled() {
            Err(JobError::Cancelled)
        } else {
            Ok(())
        }
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Resolve a service from this invocation's scope.
    pub fn resolve<T: Send + Sync + 'static>(&self) -> Result<Arc<T>, JobError> {
        self.scope.require::<T>()
    }

    pub fn origin(&self) -> JobOrigin {
        self.origin
    }

    /// Timing metadata; `None` for queued jobs.
    pub fn fire_times(&self) -> Option<&FireTimes> {
        self.fire_times.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(job_cancel: Option<CancellationToken>) -> (CancellationToken, JobContext) {
        let shutdown = CancellationToken::new();
        let ctx = JobContext::new(
            shutdown.child_token(),
            job_cancel,
            Arc::new(Scope::new()),
            JobOrigin::Queued,
            None,
        );
        (shutdown, ctx)
    }

    #[tokio::test]
    async fn host_shutdown_reaches_the_job() {
        let (shutdown, ctx) = ctx(None);
        assert!(ctx.checkpoint().is_ok());
        shutdown.cancel();
        ctx.cancelled().await;
        assert!(matches!(ctx.checkpoint(), Err(JobError::Cancelled)));
    }

    #[tokio::test]
    async fn per_job_token_cancels_only_that_job() {
        let job = CancellationToken::new();
        let (shutdown, ctx) = ctx(Some(job.clone()));
        job.cancel();
        ctx.cancelled().await;
        assert!(ctx.is_cancelled());
        assert!(!shutdown.is_cancelled());
    }
}
