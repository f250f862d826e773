use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::forecast::quantile::{MeanSource, DEFAULT_TIME_LIMIT};
use crate::forecast::sample::{
    SampleDefaults, DEFAULT_BATCH_SIZE, DEFAULT_CHECKPOINT, DEFAULT_NUM_SAMPLES,
};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub forecast: ForecastConfig,
    #[serde(default)]
    pub quantile_backend: QuantileBackendConfig,
    #[serde(default)]
    pub sample_backend: SampleBackendConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ForecastConfig {
    #[serde(default = "default_model")]
    pub default_model: String,
    #[serde(default = "default_frequency")]
    pub frequency: String,
    #[serde(default = "default_horizon")]
    pub horizon: usize,
    /// Level of events kept in the per-call diagnostic log.
    #[serde(default = "default_capture_level")]
    pub capture_level: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuantileBackendConfig {
    #[serde(default = "default_backend_url")]
    pub url: String,
    #[serde(default = "default_time_limit_secs")]
    pub time_limit_secs: u64,
    #[serde(default)]
    pub mean_source: MeanSource,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SampleBackendConfig {
    #[serde(default = "default_checkpoint")]
    pub checkpoint_path: PathBuf,
    #[serde(default = "default_num_samples")]
    pub num_samples: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub use_rope_scaling: bool,
    #[serde(default)]
    pub device: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_database_path")]
    pub database_path: String,
    #[serde(default = "default_user_id")]
    pub user_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitoringConfig {
    #[serde(default)]
    pub csv_logging: bool,
    #[serde(default = "default_csv_log_path")]
    pub csv_log_path: String,
    #[serde(default)]
    pub telegram_enabled: bool,
}

fn default_model() -> String { "amazon/chronos-t5-tiny".to_string() }
fn default_frequency() -> String { "D".to_string() }
fn default_horizon() -> usize { 7 }
fn default_capture_level() -> String { "info".to_string() }
fn default_backend_url() -> String { "http://127.0.0.1:8000".to_string() }
fn default_time_limit_secs() -> u64 { DEFAULT_TIME_LIMIT.as_secs() }
fn default_checkpoint() -> PathBuf { PathBuf::from(DEFAULT_CHECKPOINT) }
fn default_num_samples() -> usize { DEFAULT_NUM_SAMPLES }
fn default_batch_size() -> usize { DEFAULT_BATCH_SIZE }
fn default_database_path() -> String { "forecasts.db".to_string() }
fn default_user_id() -> String { "local".to_string() }
fn default_csv_log_path() -> String { "forecast_runs.csv".to_string() }

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            default_model: default_model(),
            frequency: default_frequency(),
            horizon: default_horizon(),
            capture_level: default_capture_level(),
        }
    }
}

impl Default for QuantileBackendConfig {
    fn default() -> Self {
        Self {
            url: default_backend_url(),
            time_limit_secs: default_time_limit_secs(),
            mean_source: MeanSource::default(),
        }
    }
}

impl QuantileBackendConfig {
    pub fn time_limit(&self) -> Duration {
        Duration::from_secs(self.time_limit_secs)
    }
}

impl Default for SampleBackendConfig {
    fn default() -> Self {
        Self {
            checkpoint_path: default_checkpoint(),
            num_samples: default_num_samples(),
            batch_size: default_batch_size(),
            use_rope_scaling: false,
            device: None,
        }
    }
}

impl SampleBackendConfig {
    pub fn defaults(&self) -> SampleDefaults {
        SampleDefaults {
            checkpoint_path: self.checkpoint_path.clone(),
            num_samples: self.num_samples,
            batch_size: self.batch_size,
            use_rope_scaling: self.use_rope_scaling,
            device: self.device.clone(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            user_id: default_user_id(),
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            csv_logging: false,
            csv_log_path: default_csv_log_path(),
            telegram_enabled: false,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Like `load`, but a missing file yields the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn capture_level(&self) -> Result<tracing::Level> {
        self.forecast
            .capture_level
            .parse()
            .map_err(|_| anyhow::anyhow!("Invalid capture level: {}", self.forecast.capture_level))
    }
}

/// Secrets and endpoint overrides from the environment (and `.env`).
#[derive(Debug, Clone, Default)]
pub struct EnvConfig {
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_ids: Vec<String>,
    pub quantile_backend_url: Option<String>,
}

impl EnvConfig {
    pub fn load() -> Self {
        dotenv::dotenv().ok();

        Self {
            telegram_bot_token: std::env::var("TELEGRAM_BOT_TOKEN").ok(),
            telegram_chat_ids: std::env::var("TELEGRAM_CHAT_IDS")
                .map(|ids| parse_list(&ids))
                .unwrap_or_default(),
            quantile_backend_url: std::env::var("QUANTILE_BACKEND_URL").ok(),
        }
    }
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
