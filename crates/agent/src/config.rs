//! Agent configuration
//!
//! Sources, lowest priority first: built-in defaults, an optional TOML file
//! (`sentinel.toml`, or the path in `SENTINEL_CONFIG`), then `SENTINEL_*`
//! environment variables with `__` between nested keys, for example
//! `SENTINEL_DETECTION__MAX_CONCURRENCY=4`.

use anyhow::{bail, Result};
use sentinel_lib::anomaly::DispatcherConfig;
use sentinel_lib::models::{Algorithm, Sensitivity};
use sentinel_lib::orchestrator::OrchestratorConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming the config file
pub const CONFIG_PATH_ENV: &str = "SENTINEL_CONFIG";

const DEFAULT_CONFIG_FILE: &str = "sentinel.toml";

/// Agent configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Name reported in structured logs
    #[serde(default = "default_node_name")]
    pub node_name: String,

    /// API server port
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    #[serde(default)]
    pub detection: DetectionSettings,

    #[serde(default)]
    pub schedule: ScheduleSettings,
}

/// Limits applied to every detection run
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DetectionSettings {
    pub lookback_days: i64,
    pub max_concurrency: usize,
    pub metric_timeout_ms: u64,
    pub dedup_window_days: u64,
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            lookback_days: 30,
            max_concurrency: 8,
            metric_timeout_ms: 30_000,
            dedup_window_days: 30,
        }
    }
}

/// Periodic global detection
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScheduleSettings {
    pub enabled: bool,
    pub interval_secs: u64,
    pub algorithm: Algorithm,
    pub sensitivity: f64,
    /// Retries after a failed run, so a run is attempted `max_retries + 1` times
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 3600,
            algorithm: Algorithm::Statistical,
            sensitivity: 0.5,
            max_retries: 3,
            initial_backoff_ms: 1_000,
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            node_name: default_node_name(),
            api_port: default_api_port(),
            detection: DetectionSettings::default(),
            schedule: ScheduleSettings::default(),
        }
    }
}

fn default_node_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string())
}

fn default_api_port() -> u16 {
    8080
}

impl AgentConfig {
    /// Load configuration from the default file location and environment
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE));
        Self::load_from(&path)
    }

    /// Load configuration from `path` (if it exists) and environment
    pub fn load_from(path: &Path) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(
                config::Environment::with_prefix("SENTINEL")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: AgentConfig = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.detection.lookback_days <= 0 {
            bail!("detection.lookback_days must be positive");
        }
        if self.detection.max_concurrency == 0 {
            bail!("detection.max_concurrency must be at least 1");
        }
        if self.detection.metric_timeout_ms == 0 {
            bail!("detection.metric_timeout_ms must be positive");
        }
        if self.schedule.enabled && self.schedule.interval_secs == 0 {
            bail!("schedule.interval_secs must be positive");
        }
        Sensitivity::new(self.schedule.sensitivity)?;
        Ok(())
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            lookback: chrono::Duration::days(self.detection.lookback_days),
            max_concurrency: self.detection.max_concurrency,
            metric_timeout: Duration::from_millis(self.detection.metric_timeout_ms),
        }
    }

    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            dedup_window: Duration::from_secs(self.detection.dedup_window_days * 24 * 60 * 60),
        }
    }
}
