use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::error;

use crate::job::Job;
use crate::trigger::Trigger;
use crate::types::{FireTimes, JobOrigin, TaskId, TaskSnapshot};

/// Bookkeeping for one recurring job: its trigger and execution history.
///
/// Only the pool's due computation and the scheduled loop's per-run
/// bookkeeping write to it.
pub struct ScheduledTask {
    id: TaskId,
    job: Arc<dyn Job>,
    trigger: Box<dyn Trigger>,
    cancel: Option<CancellationToken>,
    registered_at: DateTime<Utc>,
    pub(crate) total_execution_count: u64,
    pub(crate) last_known_execution_time: Option<DateTime<Utc>>,
    /// `None` = not computed yet, or the trigger had nothing to offer.
    pub(crate) next_possible_fire_time: Option<DateTime<Utc>>,
    pub(crate) actual_scheduled_fire_time: Option<DateTime<Utc>>,
}

impl ScheduledTask {
    pub(crate) fn new(
        job: Arc<dyn Job>,
        trigger: Box<dyn Trigger>,
        cancel: Option<CancellationToken>,
        registered_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: TaskId::new(),
            job,
            trigger,
            cancel,
            registered_at,
            total_execution_count: 0,
            last_known_execution_time: None,
            next_possible_fire_time: None,
            actual_scheduled_fire_time: None,
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn name(&self) -> &str {
        self.job.name()
    }

    pub fn registered_at(&self) -> DateTime<Utc> {
        self.registered_at
    }

    pub fn total_execution_count(&self) -> u64 {
        self.total_execution_count
    }

    pub fn last_known_execution_time(&self) -> Option<DateTime<Utc>> {
        self.last_known_execution_time
    }

    pub fn next_possible_fire_time(&self) -> Option<DateTime<Utc>> {
        self.next_possible_fire_time
    }

    pub fn actual_scheduled_fire_time(&self) -> Option<DateTime<Utc>> {
        self.actual_scheduled_fire_time
    }

    /// True once the per-task token, if any, has fired.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|t| t.is_cancelled())
    }

    pub(crate) fn compute_next(&mut self, from: DateTime<Utc>, execution_count: u64) -> Option<DateTime<Utc>> {
        self.trigger.next_fire_time(from, execution_count)
    }

    pub(crate) fn should_remove(&self) -> bool {
        self.trigger.should_remove_after_exhaustion()
    }

    /// Per-run bookkeeping, done right before the job is invoked.
    pub(crate) fn begin_execution(&mut self, now: DateTime<Utc>) -> Dispatch {
        let previous_run = self.last_known_execution_time;
        self.total_execution_count += 1;
        self.last_known_execution_time = Some(now);

        Dispatch {
            job: Arc::clone(&self.job),
            cancel: self.cancel.clone(),
            origin: JobOrigin::Scheduled { task_id: self.id },
            fire_times: FireTimes {
                execution_count: self.total_execution_count,
                scheduled_at: self.actual_scheduled_fire_time.unwrap_or(now),
                started_at: now,
                previous_run,
                next_fire: self.next_possible_fire_time,
            },
        }
    }

    pub fn snapshot(&self) -> TaskSnapshot {
        TaskSnapshot {
            id: self.id,
            name: self.name().to_string(),
            registered_at: self.registered_at,
            total_execution_count: self.total_execution_count,
            last_known_execution_time: self.last_known_execution_time,
            next_possible_fire_time: self.next_possible_fire_time,
        }
    }
}

impl std::fmt::Debug for ScheduledTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScheduledTask")
            .field("id", &self.id)
            .field("name", &self.name())
            .field("trigger", &self.trigger)
            .field("total_execution_count", &self.total_execution_count)
            .field("next_possible_fire_time", &self.next_possible_fire_time)
            .finish()
    }
}

/// What the scheduled loop needs to invoke one due task.
pub(crate) struct Dispatch {
    pub job: Arc<dyn Job>,
    pub cancel: Option<CancellationToken>,
    pub origin: JobOrigin,
    pub fire_times: FireTimes,
}

/// Shared slot holding a task; the inner mutex is never held across `.await`.
pub(crate) type TaskSlot = Arc<Mutex<ScheduledTask>>;

/// Lock a mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock<'a, T>(mutex: &'a Mutex<T>, what: &str) -> MutexGuard<'a, T> {
    mutex.lock().unwrap_or_else(|poisoned: PoisonError<_>| {
        error!("Mutex poisoned: {what} (recovering)");
        poisoned.into_inner()
    })
}
