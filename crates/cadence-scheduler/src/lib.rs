//! `cadence-scheduler` — in-process recurring and one-shot job execution.
//!
//! # Overview
//!
//! Recurring jobs live in a [`pool::TaskPool`], each paired with a
//! [`trigger::Trigger`]. The [`engine::ScheduledEngine`] wakes every poll
//! interval, asks the pool which tasks are due, and runs the whole batch
//! concurrently. One-shot jobs go into the [`queue::JobQueue`] and are taken
//! by one or more [`engine::QueueConsumer`]s, each job by exactly one.
//!
//! Job failures and panics never stop a loop: they are offered to the job's
//! own handler, then to the process-wide [`exception::ExceptionHandler`],
//! then logged.
//!
//! # Triggers
//!
//! | Trigger           | Behaviour                                                  |
//! |-------------------|------------------------------------------------------------|
//! | `IntervalTrigger` | Every N, optional window and repeat count; evicted when spent |
//! | `CronTrigger`     | Union of `;`-separated 5-field expressions, optional window |
//! | `NullTrigger`     | Never fires; evicted on first visit                        |

pub mod context;
pub mod cron;
pub mod engine;
pub mod error;
pub mod exception;
pub mod host;
pub mod job;
pub mod pool;
pub mod queue;
pub mod record;
pub mod scope;
pub mod trigger;
pub mod types;

pub use context::JobContext;
pub use cron::CronTrigger;
pub use engine::{InvocationOutcome, QueueConsumer, ScheduledEngine, TickSummary};
pub use error::{JobError, Result, SchedulerError};
pub use exception::{ExceptionHandler, ExceptionHandlerChain, JobFailure, NullExceptionHandler};
pub use host::{RunningScheduler, SchedulerHost};
pub use job::{FnJob, Job, ServiceJob};
pub use pool::{DueTask, TaskPool};
pub use queue::{JobQueue, QueuedJob};
pub use scope::{Scope, ScopeFactory, ServiceRegistry};
pub use trigger::{FireWindow, IntervalTrigger, NullTrigger, Trigger};
pub use types::{FireTimes, JobOrigin, TaskId, TaskSnapshot};
