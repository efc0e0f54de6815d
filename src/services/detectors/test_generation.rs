use serde::{Deserialize, Serialize};

use super::{fraction, mean, Detector};
use crate::domain::models::{DetectorConfig, HistoryBuffer, IssueKind, TestGenSample, Verdict};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestGenerationStats {
    pub success_rate: f64,
    pub immediate_failure_rate: f64,
    pub avg_tests_generated: f64,
}

/// Flags an immediate-failure rate above `secondary_threshold` or a success
/// rate below `alert_threshold`.
pub struct TestGenerationDetector;

impl Detector for TestGenerationDetector {
    type Sample = TestGenSample;
    type Stats = TestGenerationStats;

    const KIND: IssueKind = IssueKind::TestGenerationQuality;

    fn evaluate(
        history: &HistoryBuffer<TestGenSample>,
        config: &DetectorConfig,
    ) -> Verdict<TestGenerationStats> {
        let stats = TestGenerationStats {
            success_rate: fraction(history.values(), |s| s.success),
            immediate_failure_rate: fraction(history.values(), |s| s.immediate_failure),
            avg_tests_generated: mean(history.values(), |s| f64::from(s.tests_generated)),
        };

        if stats.immediate_failure_rate > config.secondary_threshold {
            Verdict {
                detected: true,
                reason: format!(
                    "{:.0}% of generated tests failed on first run",
                    stats.immediate_failure_rate * 100.0
                ),
                value: stats.immediate_failure_rate,
                stats,
            }
        } else if stats.success_rate < config.alert_threshold {
            Verdict {
                detected: true,
                reason: format!(
                    "test generation success rate {:.2} below {:.2}",
                    stats.success_rate, config.alert_threshold
                ),
                value: stats.success_rate,
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

    fn run(success: bool, immediate_failure: bool) -> TestGenSample {
        TestGenSample {
            tests_generated: 4,
            success,
            immediate_failure,
        }
    }

    #[test]
    fn test_low_success_rate_detected() {
        let history = history_of((0..20).map(|i| run(i % 2 == 0, false)), Utc::now());
        let verdict = TestGenerationDetector::evaluate(
            &history,
            &DetectorConfig::with_thresholds(0.70, 0.30),
        );
        assert!(verdict.detected);
        assert!((verdict.value - 0.5).abs() < 1e-9);
        assert!((verdict.stats.avg_tests_generated - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_immediate_failures_detected() {
        let history = history_of((0..20).map(|i| run(true, i < 8)), Utc::now());
        let verdict = TestGenerationDetector::evaluate(
            &history,
            &DetectorConfig::with_thresholds(0.70, 0.30),
        );
        assert!(verdict.detected);
        assert!((verdict.stats.immediate_failure_rate - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_healthy_generation_is_clear() {
        let history = history_of((0..20).map(|i| run(i != 0, i == 1)), Utc::now());
        let verdict = TestGenerationDetector::evaluate(
            &history,
            &DetectorConfig::with_thresholds(0.70, 0.30),
        );
        assert!(!verdict.detected);
    }
}
