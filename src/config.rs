//! Configuration loading and validation

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::Error;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub gating: GatingConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Windows, intervals and thresholds for the gating core
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatingConfig {
    /// Cooldown after a fired alert (seconds)
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,

    /// Rolling window for recurrence tracking (seconds)
    #[serde(default = "default_occurrence_window_secs")]
    pub occurrence_window_secs: u64,

    /// Window in which identical payloads are dropped (seconds)
    #[serde(default = "default_dedup_window_secs")]
    pub dedup_window_secs: u64,

    /// How often the ledger sweep runs (seconds)
    #[serde(default = "default_ledger_sweep_interval_secs")]
    pub ledger_sweep_interval_secs: u64,

    /// How often the dedup/cooldown sweep runs (seconds)
    #[serde(default = "default_dedup_sweep_interval_secs")]
    pub dedup_sweep_interval_secs: u64,

    /// Impact delta beyond which the trend is increasing/decreasing
    #[serde(default = "default_trend_threshold")]
    pub trend_threshold: u8,

    /// Whether duplicate payloads are still written to the ledger
    #[serde(default)]
    pub record_duplicates: bool,

    /// Number of striped per-key locks held by the orchestrator
    #[serde(default = "default_lock_stripes")]
    pub lock_stripes: usize,
}

fn default_cooldown_secs() -> u64 {
    15 * 60
}

fn default_occurrence_window_secs() -> u64 {
    24 * 60 * 60
}

fn default_dedup_window_secs() -> u64 {
    5 * 60
}

fn default_ledger_sweep_interval_secs() -> u64 {
    10 * 60
}

fn default_dedup_sweep_interval_secs() -> u64 {
    30
}

fn default_trend_threshold() -> u8 {
    5
}

fn default_lock_stripes() -> usize {
    64
}

impl Default for GatingConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: default_cooldown_secs(),
            occurrence_window_secs: default_occurrence_window_secs(),
            dedup_window_secs: default_dedup_window_secs(),
            ledger_sweep_interval_secs: default_ledger_sweep_interval_secs(),
            dedup_sweep_interval_secs: default_dedup_sweep_interval_secs(),
            trend_threshold: default_trend_threshold(),
            record_duplicates: false,
            lock_stripes: default_lock_stripes(),
        }
    }
}

impl GatingConfig {
    pub fn cooldown(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.cooldown_secs as i64)
    }

    pub fn occurrence_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.occurrence_window_secs as i64)
    }

    pub fn dedup_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.dedup_window_secs as i64)
    }

    pub fn ledger_sweep_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.ledger_sweep_interval_secs)
    }

    pub fn dedup_sweep_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.dedup_sweep_interval_secs)
    }

    /// Validate values before the gate is built from them
    pub fn validate(&self) -> crate::Result<()> {
        let windows = [
            ("cooldown_secs", self.cooldown_secs),
            ("occurrence_window_secs", self.occurrence_window_secs),
            ("dedup_window_secs", self.dedup_window_secs),
            ("ledger_sweep_interval_secs", self.ledger_sweep_interval_secs),
            ("dedup_sweep_interval_secs", self.dedup_sweep_interval_secs),
        ];
        for (name, value) in windows {
            if value == 0 {
                return Err(Error::Config(format!("gating.{} must be positive", name)));
            }
            // chrono::Duration::seconds panics past i64::MAX / 1000
            if value > i64::MAX as u64 / 1000 {
                return Err(Error::Config(format!(
                    "gating.{} is out of range: {}",
                    name, value
                )));
            }
        }

        if self.dedup_window_secs > self.occurrence_window_secs {
            return Err(Error::Config(format!(
                "gating.dedup_window_secs ({}) cannot exceed occurrence_window_secs ({})",
                self.dedup_window_secs, self.occurrence_window_secs
            )));
        }

        if self.trend_threshold > 100 {
            return Err(Error::Config(
                "gating.trend_threshold cannot exceed 100".into(),
            ));
        }

        if self.lock_stripes == 0 {
            return Err(Error::Config("gating.lock_stripes must be positive".into()));
        }

        Ok(())
    }
}

/// Log output settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "signal_gate=info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Config {
    /// Load configuration from file and environment variables
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let settings = config::Config::builder()
            // Start with defaults
            .set_default("gating.cooldown_secs", default_cooldown_secs() as i64)?
            .set_default("gating.occurrence_window_secs", default_occurrence_window_secs() as i64)?
            .set_default("gating.dedup_window_secs", default_dedup_window_secs() as i64)?
            // Load from file if exists
            .add_source(config::File::from(path).required(false))
            // Override with environment variables (prefix SIGNAL_GATE_)
            .add_source(
                config::Environment::with_prefix("SIGNAL_GATE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let config: Config = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        self.gating.validate()?;

        if self.logging.level.trim().is_empty() {
            anyhow::bail!("logging.level cannot be empty");
        }

        Ok(())
    }
}
