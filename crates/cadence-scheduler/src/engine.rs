//! The two execution loops: the scheduled loop polling the task pool and the
//! queue consumers draining the job queue.
//!
//! Both invoke jobs through [`invoke`], which runs the body on its own tokio
//! task so a panic is caught at the join handle and reported like any other
//! failure. Nothing a job does can stop a loop; only the shutdown token can.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::context::JobContext;
use crate::error::JobError;
use crate::exception::{report_failure, ExceptionHandler, JobFailure};
use crate::job::Job;
use crate::pool::TaskPool;
use crate::queue::JobQueue;
use crate::scope::ScopeFactory;
use crate::types::JobOrigin;

/// How one invocation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationOutcome {
    Completed,
    /// The job returned [`JobError::Cancelled`]; not a failure.
    Cancelled,
    /// Error or panic, already routed through the exception handlers.
    Failed,
}

/// Run one job body to completion and route any failure.
pub(crate) async fn invoke(
    job: Arc<dyn Job>,
    ctx: JobContext,
    handler: &dyn ExceptionHandler,
) -> InvocationOutcome {
    let origin = ctx.origin();
    let runner = Arc::clone(&job);
    let joined = tokio::spawn(async move { runner.run(&ctx).await }).await;

    let failure = match joined {
        Ok(Ok(())) => return InvocationOutcome::Completed,
        Ok(Err(JobError::Cancelled)) => {
            debug!(job = %job.name(), %origin, "job cancelled");
            return InvocationOutcome::Cancelled;
        }
        Ok(Err(JobError::Failed(e))) => JobFailure::new(job.name(), origin, e),
        Err(e) if e.is_panic() => JobFailure::from_panic(job.name(), origin, e.into_panic()),
        Err(e) => JobFailure::new(job.name(), origin, anyhow::anyhow!("job task aborted: {e}")),
    };
    report_failure(job.as_ref(), handler, failure);
    InvocationOutcome::Failed
}

/// Counts from one scheduled tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub dispatched: usize,
    /// Due tasks whose own token had already fired; not invoked.
    pub skipped: usize,
    pub completed: usize,
    pub cancelled: usize,
    pub failed: usize,
}

impl TickSummary {
    fn record(&mut self, outcome: InvocationOutcome) {
        match outcome {
            InvocationOutcome::Completed => self.completed += 1,
            InvocationOutcome::Cancelled => self.cancelled += 1,
            InvocationOutcome::Failed => self.failed += 1,
        }
    }
}

/// Polls the task pool and runs whatever is due.
pub struct ScheduledEngine {
    pool: Arc<TaskPool>,
    scopes: Arc<dyn ScopeFactory>,
    handler: Arc<dyn ExceptionHandler>,
    poll_interval: Duration,
}

impl ScheduledEngine {
    pub fn new(
        pool: Arc<TaskPool>,
        scopes: Arc<dyn ScopeFactory>,
        handler: Arc<dyn ExceptionHandler>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            pool,
            scopes,
            handler,
            poll_interval,
        }
    }

    /// One pass over the pool at `now`.
    ///
    /// A due task whose own token has fired is skipped, as the queue
    /// consumers do; its schedule still advances.
    ///
    /// All jobs due in this pass share a single scope, created only when at
    /// least one job is due and dropped once the whole batch has returned.
    #[instrument(level = "debug", skip(self, shutdown))]
    pub async fn tick(&self, now: DateTime<Utc>, shutdown: &CancellationToken) -> TickSummary {
        let (due, skipped): (Vec<_>, Vec<_>) =
            self.pool.tasks_due(now).partition(|task| !task.is_cancelled());
        for task in &skipped {
            debug!(task_id = %task.id(), "scheduled task cancelled before start, skipped");
        }
        let mut summary = TickSummary {
            dispatched: due.len(),
            skipped: skipped.len(),
            ..TickSummary::default()
        };
        if due.is_empty() {
            return summary;
        }

        let scope = Arc::new(self.scopes.create_scope());
        let batch = due.iter().map(|task| {
            let dispatch = task.begin_execution(now);
            info!(
                job = %dispatch.job.name(),
                origin = %dispatch.origin,
                run = dispatch.fire_times.execution_count,
                "executing scheduled job"
            );
            let ctx = JobContext::new(
                shutdown.child_token(),
                dispatch.cancel,
                Arc::clone(&scope),
                dispatch.origin,
                Some(dispatch.fire_times),
            );
            invoke(dispatch.job, ctx, self.handler.as_ref())
        });

        for outcome in join_all(batch).await {
            summary.record(outcome);
        }
        summary
    }

    /// Main loop: tick, then sleep the poll interval, until `shutdown` fires.
    #[instrument(skip_all, name = "scheduled_loop")]
    pub async fn run(self, shutdown: CancellationToken) {
        info!(poll_interval_secs = self.poll_interval.as_secs(), "scheduled loop started");

        while !shutdown.is_cancelled() {
            let summary = self.tick(Utc::now(), &shutdown).await;
            if summary.dispatched > 0 {
                debug!(
                    dispatched = summary.dispatched,
                    failed = summary.failed,
                    cancelled = summary.cancelled,
                    "tick finished"
                );
            }

            tokio::select! {
                () = shutdown.cancelled() => break,
                () = tokio::time::sleep(self.poll_interval) => {}
            }
        }

        info!("scheduled loop stopped");
    }
}

/// One consumer of the shared job queue. Several may run concurrently.
pub struct QueueConsumer {
    index: usize,
    queue: Arc<JobQueue>,
    scopes: Arc<dyn ScopeFactory>,
    handler: Arc<dyn ExceptionHandler>,
}

impl QueueConsumer {
    pub fn new(
        index: usize,
        queue: Arc<JobQueue>,
        scopes: Arc<dyn ScopeFactory>,
        handler: Arc<dyn ExceptionHandler>,
    ) -> Self {
        Self {
            index,
            queue,
            scopes,
            handler,
        }
    }

    /// Take jobs one at a time, each with its own scope, until `shutdown`.
    #[instrument(skip_all, name = "queue_consumer", fields(consumer = self.index))]
    pub async fn run(self, shutdown: CancellationToken) {
        debug!("queue consumer started");

        while let Some(item) = self.queue.dequeue(&shutdown).await {
            if item.cancel.as_ref().is_some_and(|t| t.is_cancelled()) {
                debug!(job = %item.job.name(), "queued job cancelled before start, skipped");
                continue;
            }
            debug!(job = %item.job.name(), "executing queued job");
            let scope = Arc::new(self.scopes.create_scope());
            let ctx = JobContext::new(shutdown.child_token(), item.cancel, scope, JobOrigin::Queued, None);
            invoke(item.job, ctx, self.handler.as_ref()).await;
        }

        debug!("queue consumer stopped");
    }
}
