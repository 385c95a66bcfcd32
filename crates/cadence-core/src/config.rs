use std::time::Duration;

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_QUEUE_CONSUMERS: usize = 1;
pub const DEFAULT_LOG_FILTER: &str = "cadence=info";

/// Top-level config (cadence.toml + CADENCE_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CadenceConfig {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Recurring-job loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// When false the scheduled loop is never started; registrations still succeed.
    #[serde(default = "bool_true")]
    pub enabled: bool,
    /// Sleep between two ticks of the scheduled loop.
    /// Override with env var: CADENCE_SCHEDULER__POLL_INTERVAL_SECS=5
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

impl SchedulerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
        }
    }
}

/// One-shot queue settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    #[serde(default = "bool_true")]
    pub enabled: bool,
    /// Number of independent consumer loops draining the queue.
    /// Each consumer runs its jobs strictly one at a time.
    #[serde(default = "default_consumers")]
    pub consumers: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            consumers: DEFAULT_QUEUE_CONSUMERS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive used when RUST_LOG is unset.
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

fn bool_true() -> bool {
    true
}
fn default_poll_interval_secs() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}
fn default_consumers() -> usize {
    DEFAULT_QUEUE_CONSUMERS
}
fn default_log_filter() -> String {
    DEFAULT_LOG_FILTER.to_string()
}

impl CadenceConfig {
    /// Load config from a TOML file with CADENCE_* env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. ~/.cadence/cadence.toml
    ///
    /// A missing file is not an error; every field has a default.
    /// Nested keys use a double underscore: `CADENCE_QUEUE__CONSUMERS=4`.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: CadenceConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("CADENCE_").split("__"))
            .extract()
            .map_err(|e| crate::error::CadenceError::Config(e.to_string()))?;

        config.validate()?;
        tracing::debug!(path = %path, "configuration loaded");
        Ok(config)
    }

    fn validate(&self) -> crate::error::Result<()> {
        if self.queue.enabled && self.queue.consumers == 0 {
            return Err(crate::error::CadenceError::Config(
                "queue.consumers must be at least 1 when the queue is enabled".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.cadence/cadence.toml", home)
}
