use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::history::DEFAULT_HISTORY_CAPACITY;

/// Main configuration structure for Overwatch
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Sample history configuration
    #[serde(default)]
    pub history: HistoryConfig,

    /// Snapshot persistence configuration
    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// Alert bus configuration
    #[serde(default)]
    pub alerts: AlertsConfig,

    /// Per-detector thresholds
    #[serde(default)]
    pub detectors: DetectorsConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format
    #[serde(default)]
    pub format: LogFormat,

    /// Directory for log files (logs only to stderr when unset)
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// File rotation policy, only used with `log_dir`
    #[serde(default)]
    pub rotation: RotationPolicy,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RotationPolicy {
    #[default]
    Daily,
    Hourly,
    Never,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            log_dir: None,
            rotation: RotationPolicy::default(),
        }
    }
}

/// Sample history configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct HistoryConfig {
    /// Samples retained per monitored stream
    #[serde(default = "default_history_capacity")]
    pub capacity: usize,
}

const fn default_history_capacity() -> usize {
    DEFAULT_HISTORY_CAPACITY
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            capacity: default_history_capacity(),
        }
    }
}

/// Snapshot persistence configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PersistenceConfig {
    /// Path of the JSON snapshot document
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: PathBuf,

    /// Interval between background flushes in milliseconds
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,

    /// Finished scopes older than this are dropped from persisted snapshots
    /// (0 keeps everything)
    #[serde(default)]
    pub retention_days: u32,
}

fn default_snapshot_path() -> PathBuf {
    PathBuf::from(".overwatch/scopes.json")
}

const fn default_flush_interval_ms() -> u64 {
    5000
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            snapshot_path: default_snapshot_path(),
            flush_interval_ms: default_flush_interval_ms(),
            retention_days: 0,
        }
    }
}

/// Alert bus configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AlertsConfig {
    /// Broadcast channel capacity; slow listeners lag past this many alerts
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

const fn default_channel_capacity() -> usize {
    1024
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
        }
    }
}

/// Thresholds for one trend/threshold detector.
///
/// `alert_threshold` and `secondary_threshold` mean different things per
/// detector; see the field docs on [`DetectorsConfig`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct DetectorConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default)]
    pub alert_threshold: f64,

    #[serde(default)]
    pub secondary_threshold: f64,

    /// Minimum samples in the buffer before evaluating
    #[serde(default = "default_min_samples")]
    pub min_samples: usize,

    /// Minimum samples inside the recency window before evaluating
    #[serde(default = "default_min_recent_samples")]
    pub min_recent_samples: usize,

    #[serde(default = "default_recency_window_secs")]
    pub recency_window_secs: u64,

    #[serde(default = "default_incident_capacity")]
    pub incident_capacity: usize,
}

const fn default_enabled() -> bool {
    true
}

const fn default_min_samples() -> usize {
    20
}

const fn default_min_recent_samples() -> usize {
    10
}

const fn default_recency_window_secs() -> u64 {
    3600
}

const fn default_incident_capacity() -> usize {
    50
}

impl DetectorConfig {
    /// Defaults with the given thresholds.
    pub const fn with_thresholds(alert_threshold: f64, secondary_threshold: f64) -> Self {
        Self {
            enabled: default_enabled(),
            alert_threshold,
            secondary_threshold,
            min_samples: default_min_samples(),
            min_recent_samples: default_min_recent_samples(),
            recency_window_secs: default_recency_window_secs(),
            incident_capacity: default_incident_capacity(),
        }
    }

    pub fn recency_window(&self) -> chrono::Duration {
        let secs = u32::try_from(self.recency_window_secs).unwrap_or(u32::MAX);
        chrono::Duration::seconds(i64::from(secs))
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self::with_thresholds(0.0, 0.0)
    }
}

/// Dependency-deadlock detector configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct DeadlockConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Wait (minutes) beyond which a blocked task counts as stalled
    #[serde(default = "default_stall_threshold_minutes")]
    pub stall_threshold_minutes: f64,

    #[serde(default = "default_incident_capacity")]
    pub incident_capacity: usize,
}

const fn default_stall_threshold_minutes() -> f64 {
    30.0
}

impl Default for DeadlockConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            stall_threshold_minutes: default_stall_threshold_minutes(),
            incident_capacity: default_incident_capacity(),
        }
    }
}

/// Per-detector configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct DetectorsConfig {
    /// `alert_threshold`: maximum |second-half − first-half| success rate.
    /// A negative trend is degradation.
    #[serde(default = "default_code_generation")]
    pub code_generation: DetectorConfig,

    /// `alert_threshold`: minimum success rate per thousand tokens per success.
    /// `secondary_threshold`: maximum missing-file rate.
    #[serde(default = "default_context_window")]
    pub context_window: DetectorConfig,

    /// `alert_threshold`: minimum success rate.
    /// `secondary_threshold`: maximum immediate-failure rate.
    #[serde(default = "default_test_generation")]
    pub test_generation: DetectorConfig,

    /// `alert_threshold`: maximum false-positive rate among blocks.
    #[serde(default = "default_validation_gate")]
    pub validation_gate: DetectorConfig,

    /// `alert_threshold`: maximum error rate and maximum timeout rate.
    /// `secondary_threshold`: maximum quality drop; the quality trend is
    /// success-oriented so a negative trend is degradation.
    #[serde(default = "default_ai_provider")]
    pub ai_provider: DetectorConfig,

    /// `alert_threshold`: maximum false-positive rate.
    /// `secondary_threshold`: maximum validation-time increase in ms; the
    /// time trend is cost-oriented so a positive trend is degradation.
    #[serde(default = "default_schema_validation")]
    pub schema_validation: DetectorConfig,

    /// `alert_threshold`: minimum match-to-application rate.
    /// `secondary_threshold`: maximum recurring-pattern rate.
    #[serde(default = "default_pattern_learning")]
    pub pattern_learning: DetectorConfig,

    #[serde(default)]
    pub deadlock: DeadlockConfig,
}

const fn default_code_generation() -> DetectorConfig {
    DetectorConfig::with_thresholds(0.20, 0.0)
}

const fn default_context_window() -> DetectorConfig {
    DetectorConfig::with_thresholds(0.05, 0.20)
}

const fn default_test_generation() -> DetectorConfig {
    DetectorConfig::with_thresholds(0.70, 0.30)
}

const fn default_validation_gate() -> DetectorConfig {
    DetectorConfig::with_thresholds(0.30, 0.0)
}

const fn default_ai_provider() -> DetectorConfig {
    DetectorConfig::with_thresholds(0.10, 0.10)
}

const fn default_schema_validation() -> DetectorConfig {
    DetectorConfig::with_thresholds(0.10, 1000.0)
}

const fn default_pattern_learning() -> DetectorConfig {
    DetectorConfig::with_thresholds(0.50, 0.30)
}

impl Default for DetectorsConfig {
    fn default() -> Self {
        Self {
            code_generation: default_code_generation(),
            context_window: default_context_window(),
            test_generation: default_test_generation(),
            validation_gate: default_validation_gate(),
            ai_provider: default_ai_provider(),
            schema_validation: default_schema_validation(),
            pattern_learning: default_pattern_learning(),
            deadlock: DeadlockConfig::default(),
        }
    }
}

impl DetectorsConfig {
    /// Named view over the trend/threshold detector configs.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &DetectorConfig)> {
        [
            ("code_generation", &self.code_generation),
            ("context_window", &self.context_window),
            ("test_generation", &self.test_generation),
            ("validation_gate", &self.validation_gate),
            ("ai_provider", &self.ai_provider),
            ("schema_validation", &self.schema_validation),
            ("pattern_learning", &self.pattern_learning),
        ]
        .into_iter()
    }
}
