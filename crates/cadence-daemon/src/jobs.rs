//! Built-in jobs registered by the daemon.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use cadence_scheduler::{FnJob, Job, JobContext, JobError, JobFailure, ServiceJob};
use chrono::Utc;
use tracing::{info, warn};

/// Counters shared by every job through the service registry.
#[derive(Debug, Default)]
pub struct Stats {
    heartbeats: AtomicU64,
}

impl Stats {
    pub fn heartbeats(&self) -> u64 {
        self.heartbeats.load(Ordering::Relaxed)
    }
}

/// Logs liveness and how late the loop picked it up.
pub struct Heartbeat;

#[async_trait]
impl Job for Heartbeat {
    fn name(&self) -> &str {
        "heartbeat"
    }

    async fn run(&self, ctx: &JobContext) -> Result<(), JobError> {
        let stats = ctx.resolve::<Stats>()?;
        let beat = stats.heartbeats.fetch_add(1, Ordering::Relaxed) + 1;
        match ctx.fire_times() {
            Some(times) => info!(
                beat,
                run = times.execution_count,
                drift_ms = times.drift().num_milliseconds(),
                next = ?times.next_fire,
                "heartbeat"
            ),
            None => info!(beat, "heartbeat"),
        }
        Ok(())
    }

    fn handle_error(&self, failure: &JobFailure) -> bool {
        warn!("heartbeat skipped: {failure}");
        true
    }
}

/// Daily summary of the shared counters.
pub fn daily_report() -> Arc<dyn Job> {
    Arc::new(ServiceJob::new("daily-report", |stats: Arc<Stats>, ctx: JobContext| async move {
        ctx.checkpoint()?;
        info!(heartbeats = stats.heartbeats(), "daily report");
        Ok(())
    }))
}

/// One-shot job queued at startup.
pub fn startup_banner() -> Arc<dyn Job> {
    Arc::new(FnJob::new("startup-banner", |_ctx: JobContext| async move {
        info!(started_at = %Utc::now(), version = env!("CARGO_PKG_VERSION"), "cadence daemon up");
        Ok(())
    }))
}
