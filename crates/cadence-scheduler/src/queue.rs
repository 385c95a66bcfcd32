//! Unbounded FIFO of one-shot jobs shared by all queue consumers.
//!
//! Every enqueue adds one permit to a semaphore; a consumer takes a permit
//! before popping, so it sleeps while the queue is empty and wakes exactly
//! once per item. Each job is delivered to exactly one consumer.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::job::Job;
use crate::record::lock;

/// A job waiting in (or just taken from) the queue.
pub struct QueuedJob {
    pub job: Arc<dyn Job>,
    /// Per-job token, combined with host shutdown when the job runs.
    pub cancel: Option<CancellationToken>,
}

impl std::fmt::Debug for QueuedJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueuedJob")
            .field("job", &self.job.name())
            .field("has_cancel", &self.cancel.is_some())
            .finish()
    }
}

pub struct JobQueue {
    items: Mutex<VecDeque<QueuedJob>>,
    available: Semaphore,
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl JobQueue {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            available: Semaphore::new(0),
        }
    }

    /// Append a job. Never blocks; safe from any thread.
    pub fn enqueue(&self, job: Arc<dyn Job>) {
        self.push(QueuedJob { job, cancel: None });
    }

    /// Append a job that can be cancelled through `cancel` on its own.
    pub fn enqueue_with_cancel(&self, job: Arc<dyn Job>, cancel: CancellationToken) {
        self.push(QueuedJob {
            job,
            cancel: Some(cancel),
        });
    }

    fn push(&self, item: QueuedJob) {
        debug!(job = %item.job.name(), "job enqueued");
        lock(&self.items, "job queue").push_back(item);
        self.available.add_permits(1);
    }

    /// Wait for the next job. Returns `None` once `shutdown` fires; a job
    /// still queued at that point stays queued.
    pub async fn dequeue(&self, shutdown: &CancellationToken) -> Option<QueuedJob> {
        loop {
            let permit = tokio::select! {
                biased;
                () = shutdown.cancelled() => return None,
                permit = self.available.acquire() => permit.ok()?,
            };
            permit.forget();
            // A permit is only ever added after its item is pushed.
            if let Some(item) = lock(&self.items, "job queue").pop_front() {
                return Some(item);
            }
        }
    }

    /// Pop without waiting.
    pub fn try_dequeue(&self) -> Option<QueuedJob> {
        let permit = self.available.try_acquire().ok()?;
        permit.forget();
        lock(&self.items, "job queue").pop_front()
    }

    pub fn len(&self) -> usize {
        lock(&self.items, "job queue").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for JobQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobQueue").field("len", &self.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::JobContext;
    use crate::error::JobError;
    use async_trait::async_trait;
    use std::time::Duration;

    struct Named(&'static str);

    #[async_trait]
    impl Job for Named {
        fn name(&self) -> &str {
            self.0
        }
        async fn run(&self, _ctx: &JobContext) -> Result<(), JobError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn delivers_in_fifo_order() {
        let queue = JobQueue::new();
        for name in ["a", "b", "c"] {
            queue.enqueue(Arc::new(Named(name)));
        }
        assert_eq!(queue.len(), 3);

        let shutdown = CancellationToken::new();
        let mut names = Vec::new();
        while let Some(item) = queue.try_dequeue() {
            names.push(item.job.name().to_string());
        }
        assert_eq!(names, ["a", "b", "c"]);
        assert!(queue.is_empty());

        queue.enqueue(Arc::new(Named("d")));
        let item = queue.dequeue(&shutdown).await.unwrap();
        assert_eq!(item.job.name(), "d");
    }

    #[tokio::test]
    async fn blocked_consumer_wakes_on_enqueue() {
        let queue = Arc::new(JobQueue::new());
        let shutdown = CancellationToken::new();

        let consumer = {
            let queue = Arc::clone(&queue);
            let shutdown = shutdown.clone();
            tokio::spawn(async move { queue.dequeue(&shutdown).await.map(|i| i.job.name().to_string()) })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.enqueue(Arc::new(Named("late")));

        let got = tokio::time::timeout(Duration::from_secs(1), consumer).await.unwrap().unwrap();
        assert_eq!(got.as_deref(), Some("late"));
    }

    #[tokio::test]
    async fn cancellation_ends_the_wait() {
        let queue = JobQueue::new();
        let shutdown = CancellationToken::new();
        shutdown.cancel();
        assert!(queue.dequeue(&shutdown).await.is_none());

        queue.enqueue(Arc::new(Named("kept")));
        assert!(queue.dequeue(&shutdown).await.is_none());
        assert_eq!(queue.len(), 1);
    }
}
