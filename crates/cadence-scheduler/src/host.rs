//! Process-level entry point wiring the pool, the queue and their loops.

use std::sync::Arc;

use cadence_core::CadenceConfig;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::cron::CronTrigger;
use crate::engine::{QueueConsumer, ScheduledEngine};
use crate::error::Result;
use crate::exception::{ExceptionHandler, NullExceptionHandler};
use crate::job::Job;
use crate::pool::TaskPool;
use crate::queue::JobQueue;
use crate::scope::{ScopeFactory, ServiceRegistry};
use crate::trigger::Trigger;
use crate::types::{TaskId, TaskSnapshot};

/// Owns the task pool and the job queue, and starts the loops that serve
/// them. Registration works before and after [`SchedulerHost::start`].
pub struct SchedulerHost {
    config: CadenceConfig,
    pool: Arc<TaskPool>,
    queue: Arc<JobQueue>,
    scopes: Arc<dyn ScopeFactory>,
    handler: Arc<dyn ExceptionHandler>,
}

impl SchedulerHost {
    pub fn new(config: CadenceConfig) -> Self {
        Self {
            config,
            pool: Arc::new(TaskPool::new()),
            queue: Arc::new(JobQueue::new()),
            scopes: Arc::new(ServiceRegistry::new()),
            handler: Arc::new(NullExceptionHandler),
        }
    }

    pub fn with_scopes(mut self, scopes: Arc<dyn ScopeFactory>) -> Self {
        self.scopes = scopes;
        self
    }

    pub fn with_exception_handler(mut self, handler: Arc<dyn ExceptionHandler>) -> Self {
        self.handler = handler;
        self
    }

    pub fn config(&self) -> &CadenceConfig {
        &self.config
    }

    pub fn pool(&self) -> &Arc<TaskPool> {
        &self.pool
    }

    pub fn queue(&self) -> &Arc<JobQueue> {
        &self.queue
    }

    pub fn schedule_recurring(&self, job: Arc<dyn Job>, trigger: Box<dyn Trigger>) -> TaskId {
        self.pool.schedule(job, trigger)
    }

    pub fn schedule_with_cancel(
        &self,
        job: Arc<dyn Job>,
        trigger: Box<dyn Trigger>,
        cancel: CancellationToken,
    ) -> TaskId {
        self.pool.schedule_with_cancel(job, trigger, cancel)
    }

    /// Shorthand for a [`CronTrigger`] parsed from `expression`.
    pub fn schedule_cron(&self, job: Arc<dyn Job>, expression: &str) -> Result<TaskId> {
        let trigger = CronTrigger::parse(expression)?;
        Ok(self.pool.schedule(job, Box::new(trigger)))
    }

    pub fn unschedule(&self, id: TaskId) -> Result<()> {
        self.pool.unschedule(id)
    }

    pub fn enqueue(&self, job: Arc<dyn Job>) {
        self.queue.enqueue(job);
    }

    pub fn enqueue_with_cancel(&self, job: Arc<dyn Job>, cancel: CancellationToken) {
        self.queue.enqueue_with_cancel(job, cancel);
    }

    pub fn tasks(&self) -> Vec<TaskSnapshot> {
        self.pool.snapshot()
    }

    /// Spawn the scheduled loop and the queue consumers enabled in config.
    pub fn start(&self, shutdown: CancellationToken) -> RunningScheduler {
        let mut handles = Vec::new();

        if self.config.scheduler.enabled {
            let engine = ScheduledEngine::new(
                Arc::clone(&self.pool),
                Arc::clone(&self.scopes),
                Arc::clone(&self.handler),
                self.config.scheduler.poll_interval(),
            );
            handles.push(tokio::spawn(engine.run(shutdown.clone())));
        }

        if self.config.queue.enabled {
            for index in 0..self.config.queue.consumers {
                let consumer = QueueConsumer::new(
                    index,
                    Arc::clone(&self.queue),
                    Arc::clone(&self.scopes),
                    Arc::clone(&self.handler),
                );
                handles.push(tokio::spawn(consumer.run(shutdown.clone())));
            }
        }

        let consumers = if self.config.queue.enabled { self.config.queue.consumers } else { 0 };
        info!(
            scheduled = self.config.scheduler.enabled,
            consumers,
            tasks = self.pool.len(),
            "scheduler host started"
        );

        RunningScheduler { shutdown, handles }
    }
}

impl std::fmt::Debug for SchedulerHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulerHost")
            .field("pool", &self.pool)
            .field("queue", &self.queue)
            .finish()
    }
}

/// Handle on the spawned loops.
#[derive(Debug)]
pub struct RunningScheduler {
    shutdown: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl RunningScheduler {
    /// Number of spawned loops (scheduled loop plus consumers).
    pub fn loops(&self) -> usize {
        self.handles.len()
    }

    /// Request shutdown without waiting.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Wait for every loop to exit. Jobs already running finish first.
    pub async fn join(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                error!("scheduler loop terminated abnormally: {e}");
            }
        }
        info!("scheduler host stopped");
    }

    /// [`RunningScheduler::shutdown`] followed by [`RunningScheduler::join`].
    pub async fn stop(self) {
        self.shutdown();
        self.join().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::JobContext;
    use crate::job::FnJob;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn config(scheduled: bool, consumers: usize) -> CadenceConfig {
        let mut config = CadenceConfig::default();
        config.scheduler.enabled = scheduled;
        config.queue.consumers = consumers;
        config
    }

    #[tokio::test]
    async fn start_respects_enabled_flags() {
        let host = SchedulerHost::new(config(true, 3));
        let running = host.start(CancellationToken::new());
        assert_eq!(running.loops(), 4);
        running.stop().await;

        let mut cfg = config(false, 2);
        cfg.queue.enabled = false;
        let running = SchedulerHost::new(cfg).start(CancellationToken::new());
        assert_eq!(running.loops(), 0);
        running.stop().await;
    }

    #[tokio::test]
    async fn enqueued_jobs_run_after_start() {
        let host = SchedulerHost::new(config(false, 1));
        let ran = Arc::new(AtomicUsize::new(0));
        let r = Arc::clone(&ran);
        host.enqueue(Arc::new(FnJob::new("once", move |_ctx: JobContext| {
            r.fetch_add(1, Ordering::SeqCst);
            async { Ok(()) }
        })));

        let running = host.start(CancellationToken::new());
        tokio::time::timeout(Duration::from_secs(1), async {
            while ran.load(Ordering::SeqCst) == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        running.stop().await;
        assert!(host.queue().is_empty());
    }

    #[test]
    fn schedule_cron_rejects_bad_expressions() {
        let host = SchedulerHost::new(CadenceConfig::default());
        let job: Arc<dyn Job> = Arc::new(FnJob::new("c", |_ctx: JobContext| async { Ok(()) }));
        assert!(host.schedule_cron(Arc::clone(&job), "not a cron").is_err());
        let id = host.schedule_cron(job, "*/5 * * * *").unwrap();
        assert_eq!(host.tasks()[0].id, id);
        host.unschedule(id).unwrap();
        assert!(host.tasks().is_empty());
    }
}
