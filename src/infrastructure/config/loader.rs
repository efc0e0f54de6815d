use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::config::{Config, DetectorConfig};

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid history capacity: {0}. Must be at least 1")]
    InvalidHistoryCapacity(usize),

    #[error("Invalid flush_interval_ms: {0}. Must be positive")]
    InvalidFlushInterval(u64),

    #[error("Snapshot path cannot be empty")]
    EmptySnapshotPath,

    #[error("Invalid channel_capacity: {0}. Must be at least 1")]
    InvalidChannelCapacity(usize),

    #[error("Invalid threshold for detector '{detector}': {value}. Must be finite and non-negative")]
    InvalidThreshold { detector: String, value: f64 },

    #[error(
        "Invalid sample gate for detector '{detector}': min_recent_samples ({recent}) exceeds min_samples ({total})"
    )]
    InvalidSampleGate {
        detector: String,
        recent: usize,
        total: usize,
    },

    #[error("Invalid incident_capacity for detector '{detector}': {value}. Must be between 1 and 100")]
    InvalidIncidentCapacity { detector: String, value: usize },
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .overwatch/config.yaml (project config)
    /// 3. .overwatch/local.yaml (project local overrides, optional)
    /// 4. Environment variables (OVERWATCH_* prefix, `__` for nesting)
    pub fn load() -> Result<Config> {
        let config: Config = Self::figment()
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file, still honouring env overrides
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .merge(Env::prefixed("OVERWATCH_").split("__"))
            .extract()
            .with_context(|| format!("Failed to load config from {}", path.as_ref().display()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    fn figment() -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(".overwatch/config.yaml"))
            .merge(Yaml::file(".overwatch/local.yaml"))
            .merge(Env::prefixed("OVERWATCH_").split("__"))
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.to_lowercase().as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        if config.history.capacity == 0 {
            return Err(ConfigError::InvalidHistoryCapacity(config.history.capacity));
        }

        if config.persistence.flush_interval_ms == 0 {
            return Err(ConfigError::InvalidFlushInterval(
                config.persistence.flush_interval_ms,
            ));
        }

        if config.persistence.snapshot_path.as_os_str().is_empty() {
            return Err(ConfigError::EmptySnapshotPath);
        }

        if config.alerts.channel_capacity == 0 {
            return Err(ConfigError::InvalidChannelCapacity(
                config.alerts.channel_capacity,
            ));
        }

        for (name, detector) in config.detectors.iter() {
            Self::validate_detector(name, detector)?;
        }

        let deadlock = &config.detectors.deadlock;
        check_threshold("deadlock", deadlock.stall_threshold_minutes)?;
        if deadlock.stall_threshold_minutes == 0.0 {
            return Err(ConfigError::InvalidThreshold {
                detector: "deadlock".to_string(),
                value: deadlock.stall_threshold_minutes,
            });
        }
        check_incident_capacity("deadlock", deadlock.incident_capacity)?;

        Ok(())
    }

    fn validate_detector(name: &str, detector: &DetectorConfig) -> Result<(), ConfigError> {
        check_threshold(name, detector.alert_threshold)?;
        check_threshold(name, detector.secondary_threshold)?;

        if detector.min_recent_samples > detector.min_samples {
            return Err(ConfigError::InvalidSampleGate {
                detector: name.to_string(),
                recent: detector.min_recent_samples,
                total: detector.min_samples,
            });
        }

        check_incident_capacity(name, detector.incident_capacity)
    }
}

fn check_threshold(detector: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidThreshold {
            detector: detector.to_string(),
            value,
        })
    }
}

fn check_incident_capacity(detector: &str, value: usize) -> Result<(), ConfigError> {
    if (1..=100).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::InvalidIncidentCapacity {
            detector: detector.to_string(),
            value,
        })
    }
}
