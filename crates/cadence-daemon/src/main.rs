use std::sync::Arc;

use cadence_core::CadenceConfig;
use cadence_scheduler::{IntervalTrigger, SchedulerHost, ServiceRegistry};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

mod jobs;

#[derive(Debug, Parser)]
#[command(name = "cadence", version, about = "In-process job scheduler daemon")]
struct Cli {
    /// Path to cadence.toml (defaults to ~/.cadence/cadence.toml).
    #[arg(short, long, env = "CADENCE_CONFIG")]
    config: Option<String>,

    /// Seconds between two heartbeats.
    #[arg(long, default_value_t = 30)]
    heartbeat_secs: i64,

    /// Cron expression(s) for the daily report, `;`-separated.
    #[arg(long, default_value = "0 6 * * *")]
    report_cron: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // config is loaded first so its log filter can seed the subscriber
    let loaded = CadenceConfig::load(cli.config.as_deref());
    let fallback_filter = match &loaded {
        Ok(config) => config.logging.filter.clone(),
        Err(_) => cadence_core::config::DEFAULT_LOG_FILTER.to_string(),
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| fallback_filter.into()),
        )
        .init();

    let config = loaded.unwrap_or_else(|e| {
        warn!("Config load failed ({}), using defaults", e);
        CadenceConfig::default()
    });

    let registry = ServiceRegistry::new().singleton(Arc::new(jobs::Stats::default()));
    let host = SchedulerHost::new(config).with_scopes(Arc::new(registry));

    host.schedule_recurring(
        Arc::new(jobs::Heartbeat),
        Box::new(IntervalTrigger::every_secs(cli.heartbeat_secs)?),
    );
    host.schedule_cron(jobs::daily_report(), &cli.report_cron)?;
    host.enqueue(jobs::startup_banner());

    for task in host.tasks() {
        info!(task_id = %task.id, name = %task.name, "registered");
    }

    let shutdown = CancellationToken::new();
    let running = host.start(shutdown.clone());

    tokio::signal::ctrl_c().await?;
    info!("ctrl-c received, shutting down");
    running.stop().await;
    Ok(())
}
