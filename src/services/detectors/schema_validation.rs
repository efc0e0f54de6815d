use serde::{Deserialize, Serialize};

use super::{fraction, mean, Detector};
use crate::domain::models::{
    DetectorConfig, HistoryBuffer, IssueKind, SchemaValidationSample, Verdict,
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaValidationStats {
    /// False positives among rejected documents.
    pub false_positive_rate: f64,
    pub failure_rate: f64,
    pub first_half_time_ms: f64,
    pub second_half_time_ms: f64,
    /// `second_half_time_ms - first_half_time_ms`; positive means degradation.
    pub validation_time_trend_ms: f64,
}

/// Flags a false-positive rate above `alert_threshold` or validation time
/// growing by more than `secondary_threshold` milliseconds.
pub struct SchemaValidationDetector;

impl Detector for SchemaValidationDetector {
    type Sample = SchemaValidationSample;
    type Stats = SchemaValidationStats;

    const KIND: IssueKind = IssueKind::SchemaValidationConsistency;

    fn evaluate(
        history: &HistoryBuffer<SchemaValidationSample>,
        config: &DetectorConfig,
    ) -> Verdict<SchemaValidationStats> {
        let (first, second) = history.halves();
        let first_half_time_ms = mean(first, |s| s.validation_time_ms);
        let second_half_time_ms = mean(second, |s| s.validation_time_ms);

        let stats = SchemaValidationStats {
            false_positive_rate: fraction(history.values().filter(|s| !s.valid), |s| {
                s.false_positive
            }),
            failure_rate: fraction(history.values(), |s| !s.valid),
            first_half_time_ms,
            second_half_time_ms,
            validation_time_trend_ms: second_half_time_ms - first_half_time_ms,
        };

        if stats.false_positive_rate > config.alert_threshold {
            Verdict {
                detected: true,
                reason: format!(
                    "schema false positive rate {:.2} above {:.2}",
                    stats.false_positive_rate, config.alert_threshold
                ),
                value: stats.false_positive_rate,
                stats,
            }
        } else if stats.validation_time_trend_ms > config.secondary_threshold {
            Verdict {
                detected: true,
                reason: format!(
                    "validation time grew from {first_half_time_ms:.0}ms to {second_half_time_ms:.0}ms"
                ),
                value: stats.validation_time_trend_ms,
                stats,
            }
        } else {
            Verdict::clear(stats)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::detectors::test_support::history_of;
    use chrono::Utc;

    fn validation(valid: bool, false_positive: bool, ms: f64) -> SchemaValidationSample {
        SchemaValidationSample {
            valid,
            false_positive,
            validation_time_ms: ms,
        }
    }

    fn config() -> DetectorConfig {
        DetectorConfig::with_thresholds(0.10, 1000.0)
    }

    #[test]
    fn test_slowdown_detected() {
        let history = history_of(
            (0..20).map(|i| validation(true, false, if i < 10 { 200.0 } else { 1_500.0 })),
            Utc::now(),
        );
        let verdict = SchemaValidationDetector::evaluate(&history, &config());
        assert!(verdict.detected);
        assert!((verdict.value - 1_300.0).abs() < 1e-9);
    }

    #[test]
    fn test_speedup_is_clear() {
        let history = history_of(
            (0..20).map(|i| validation(true, false, if i < 10 { 1_500.0 } else { 200.0 })),
            Utc::now(),
        );
        let verdict = SchemaValidationDetector::evaluate(&history, &config());
        assert!(!verdict.detected);
        assert!(verdict.stats.validation_time_trend_ms < 0.0);
    }

    #[test]
    fn test_false_positives_detected() {
        let history = history_of(
            (0..20).map(|i| validation(i >= 5, i < 2, 100.0)),
            Utc::now(),
        );
        let verdict = SchemaValidationDetector::evaluate(&history, &config());
        assert!((verdict.stats.failure_rate - 0.25).abs() < 1e-9);
        assert!((verdict.stats.false_positive_rate - 0.4).abs() < 1e-9);
        assert!(verdict.detected);
    }
}
