//! Registry of recurring tasks and the due-task computation.
//!
//! The pool mutex only guards membership. Every record sits behind its own
//! mutex, so a tick iterating a snapshot never blocks registrations and a
//! task scheduled mid-iteration is simply picked up on the next tick.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{Result, SchedulerError};
use crate::job::Job;
use crate::record::{lock, Dispatch, ScheduledTask, TaskSlot};
use crate::trigger::Trigger;
use crate::types::{TaskId, TaskSnapshot};

#[derive(Default)]
pub struct TaskPool {
    tasks: Mutex<Vec<TaskSlot>>,
}

impl TaskPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a recurring job. Its first fire time is computed lazily on
    /// the next tick, seeded from the registration instant.
    pub fn schedule(&self, job: Arc<dyn Job>, trigger: Box<dyn Trigger>) -> TaskId {
        self.schedule_at(job, trigger, None, Utc::now())
    }

    /// Register with a per-job cancellation token, cancelled independently of
    /// host shutdown.
    pub fn schedule_with_cancel(
        &self,
        job: Arc<dyn Job>,
        trigger: Box<dyn Trigger>,
        cancel: CancellationToken,
    ) -> TaskId {
        self.schedule_at(job, trigger, Some(cancel), Utc::now())
    }

    /// Register with an explicit registration instant.
    pub fn schedule_at(
        &self,
        job: Arc<dyn Job>,
        trigger: Box<dyn Trigger>,
        cancel: Option<CancellationToken>,
        registered_at: DateTime<Utc>,
    ) -> TaskId {
        let task = ScheduledTask::new(job, trigger, cancel, registered_at);
        let id = task.id();
        debug!(task_id = %id, job = %task.name(), "task scheduled");
        lock(&self.tasks, "task pool").push(Arc::new(Mutex::new(task)));
        id
    }

    /// Remove a task. An invocation already dispatched runs to completion.
    pub fn unschedule(&self, id: TaskId) -> Result<()> {
        let mut tasks = lock(&self.tasks, "task pool");
        let before = tasks.len();
        tasks.retain(|slot| lock(slot, "scheduled task").id() != id);
        if tasks.len() == before {
            return Err(SchedulerError::TaskNotFound { id: id.to_string() });
        }
        info!(task_id = %id, "task unscheduled");
        Ok(())
    }

    pub fn len(&self) -> usize {
        lock(&self.tasks, "task pool").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: TaskId) -> bool {
        self.slots().iter().any(|slot| lock(slot, "scheduled task").id() == id)
    }

    /// Point-in-time view of every registered task, in registration order.
    pub fn snapshot(&self) -> Vec<TaskSnapshot> {
        self.slots()
            .iter()
            .map(|slot| lock(slot, "scheduled task").snapshot())
            .collect()
    }

    /// Lazily walk a snapshot of the pool, yielding the tasks due at `now`.
    ///
    /// For every record visited the cached next fire time is (re)computed when
    /// missing; records whose trigger is exhausted and asks for removal are
    /// evicted. A yielded task has already had its next fire time advanced
    /// past `now`, so calling this twice for the same `now` yields nothing
    /// the second time. The iterator cannot be restarted.
    pub fn tasks_due(&self, now: DateTime<Utc>) -> TasksDue<'_> {
        TasksDue {
            pool: self,
            pending: self.slots().into_iter(),
            now,
        }
    }

    fn slots(&self) -> Vec<TaskSlot> {
        lock(&self.tasks, "task pool").clone()
    }

    fn evict(&self, slot: &TaskSlot) {
        lock(&self.tasks, "task pool").retain(|s| !Arc::ptr_eq(s, slot));
    }
}

impl std::fmt::Debug for TaskPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskPool").field("tasks", &self.len()).finish()
    }
}

/// One-shot iterator returned by [`TaskPool::tasks_due`].
pub struct TasksDue<'a> {
    pool: &'a TaskPool,
    pending: std::vec::IntoIter<TaskSlot>,
    now: DateTime<Utc>,
}

impl Iterator for TasksDue<'_> {
    type Item = DueTask;

    fn next(&mut self) -> Option<DueTask> {
        for slot in self.pending.by_ref() {
            let mut task = lock(&slot, "scheduled task");

            if task.next_possible_fire_time.is_none() {
                let seed = task.last_known_execution_time.unwrap_or(task.registered_at());
                let count = task.total_execution_count;
                task.next_possible_fire_time = task.compute_next(seed, count);
            }

            let Some(fire_at) = task.next_possible_fire_time else {
                if task.should_remove() {
                    let id = task.id();
                    let runs = task.total_execution_count;
                    drop(task);
                    self.pool.evict(&slot);
                    info!(task_id = %id, runs, "trigger exhausted, task removed");
                }
                continue;
            };

            if fire_at > self.now {
                continue;
            }

            task.actual_scheduled_fire_time = Some(fire_at);
            let count = task.total_execution_count + 1;
            task.next_possible_fire_time = task.compute_next(self.now, count);
            drop(task);
            return Some(DueTask { slot });
        }
        None
    }
}

/// A task selected for execution on the current tick.
pub struct DueTask {
    slot: TaskSlot,
}

impl DueTask {
    pub fn id(&self) -> TaskId {
        lock(&self.slot, "scheduled task").id()
    }

    pub fn snapshot(&self) -> TaskSnapshot {
        lock(&self.slot, "scheduled task").snapshot()
    }

    pub fn is_cancelled(&self) -> bool {
        lock(&self.slot, "scheduled task").is_cancelled()
    }

    pub(crate) fn begin_execution(&self, now: DateTime<Utc>) -> Dispatch {
        lock(&self.slot, "scheduled task").begin_execution(now)
    }
}

impl std::fmt::Debug for DueTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("DueTask").field(&self.id()).finish()
    }
}
