use serde::{Deserialize, Serialize};

use super::{fraction, mean, Detector};
use crate::domain::models::{DetectorConfig, HistoryBuffer, IssueKind, ValidationSample, Verdict};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationGateStats {
    pub block_rate: f64,
    /// False positives among blocked evaluations.
    pub false_positive_rate: f64,
    pub avg_duration_ms: f64,
}

/// Flags a gate whose blocks are wrong more often than `alert_threshold`.
pub struct ValidationGateDetector;

impl Detector for ValidationGateDetector {
    type Sample = ValidationSample;
    type Stats = ValidationGateStats;

    const KIND: IssueKind = IssueKind::ValidationGateOverBlocking;

    fn evaluate(
        history: &HistoryBuffer<ValidationSample>,
        config: &DetectorConfig,
    ) -> Verdict<ValidationGateStats> {
        let stats = ValidationGateStats {
            block_rate: fraction(history.values(), |s| s.blocked),
            false_positive_rate: fraction(history.values().filter(|s| s.blocked), |s| {
                s.false_positive
            }),
            avg_duration_ms: mean(history.values(), |s| s.duration_ms),
        };

        if stats.false_positive_rate > config.alert_threshold {
            Verdict {
                detected: true,
                reason: format!(
                    "{:.0}% of blocks were false positives",
                    stats.false_positive_rate * 100.0
                ),
                value: stats.false_positive_rate,
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

    fn gate(blocked: bool, false_positive: bool) -> ValidationSample {
        ValidationSample {
            blocked,
            false_positive,
            duration_ms: 40.0,
        }
    }

    #[test]
    fn test_false_positive_rate_counts_blocks_only() {
        // 10 blocks, 4 wrong; 10 passes.
        let history = history_of(
            (0..20).map(|i| gate(i < 10, i < 4)),
            Utc::now(),
        );
        let verdict = ValidationGateDetector::evaluate(
            &history,
            &DetectorConfig::with_thresholds(0.30, 0.0),
        );
        assert!((verdict.stats.block_rate - 0.5).abs() < 1e-9);
        assert!((verdict.stats.false_positive_rate - 0.4).abs() < 1e-9);
        assert!(verdict.detected);
    }

    #[test]
    fn test_no_blocks_is_clear() {
        let history = history_of((0..20).map(|_| gate(false, false)), Utc::now());
        let verdict = ValidationGateDetector::evaluate(
            &history,
            &DetectorConfig::with_thresholds(0.30, 0.0),
        );
        assert!(!verdict.detected);
        assert_eq!(verdict.stats.false_positive_rate, 0.0);
        assert!((verdict.stats.avg_duration_ms - 40.0).abs() < 1e-9);
    }
}
