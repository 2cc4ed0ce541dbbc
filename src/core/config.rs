use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_PATH_ENV: &str = "COMET_CONFIG";
const LOG_LEVEL_ENV: &str = "COMET_LOG_LEVEL";

fn default_max_retries() -> u32 {
    10
}

fn default_inactivity_timeout_seconds() -> u64 {
    30 * 60
}

fn default_sweep_interval_seconds() -> u64 {
    10
}

/// Top-level configuration for the delivery core.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub delivery: DeliveryConfig,
    #[serde(default)]
    pub sweep: SweepConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeliveryConfig {
    /// Flush cycles a sequenced stanza survives without an acknowledgement
    /// before delivery is abandoned.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Inactivity after which a client's state is evicted by the sweep.
    #[serde(default = "default_inactivity_timeout_seconds")]
    pub inactivity_timeout_seconds: u64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            inactivity_timeout_seconds: default_inactivity_timeout_seconds(),
        }
    }
}

impl DeliveryConfig {
    pub fn inactivity_timeout(&self) -> Duration {
        Duration::from_secs(self.inactivity_timeout_seconds)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SweepConfig {
    #[serde(default = "default_sweep_interval_seconds")]
    pub interval_seconds: u64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval_seconds: default_sweep_interval_seconds(),
        }
    }
}

impl SweepConfig {
    /// Sweep period, never below one second.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds.max(1))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default)]
    pub log_level: Option<String>,
}

fn is_json(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "json")
}

fn env_config_path() -> PathBuf {
    env::var(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config/comet.toml"))
}

impl Config {
    /// Load from the path named by `COMET_CONFIG`, defaulting to
    /// `config/comet.toml`, then apply environment overrides.
    pub fn load_from_env() -> Result<Self> {
        let path = env_config_path();
        let mut config = Self::load(&path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load a TOML (or, by extension, JSON) configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .with_context(|| format!("unable to read config {}", path.display()))?;
        if is_json(path) {
            serde_json::from_str(&data)
                .with_context(|| format!("invalid JSON config {}", path.display()))
        } else {
            toml::from_str(&data)
                .with_context(|| format!("invalid TOML config {}", path.display()))
        }
    }

    pub fn apply_env_overrides(&mut self) {
        if let Ok(level) = env::var(LOG_LEVEL_ENV) {
            self.telemetry.log_level = Some(level);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.delivery.max_retries == 0 {
            bail!("delivery.max_retries must be at least 1");
        }
        if self.delivery.inactivity_timeout_seconds == 0 {
            bail!("delivery.inactivity_timeout_seconds must be at least 1");
        }
        if self.sweep.interval_seconds == 0 {
            bail!("sweep.interval_seconds must be at least 1");
        }
        Ok(())
    }
}
