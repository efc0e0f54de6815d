use serde::{Deserialize, Serialize};

use super::{fraction, ratio, Detector};
use crate::domain::models::{
    ContextBuildSample, DetectorConfig, HistoryBuffer, IssueKind, Verdict,
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextWindowStats {
    pub success_rate: f64,
    /// Thousands of tokens spent per successful build.
    pub tokens_per_success: f64,
    /// `success_rate / tokens_per_success`; equals `success_rate` when no
    /// tokens were recorded.
    pub efficiency_ratio: f64,
    /// Missing files over requested files across the buffer.
    pub missing_file_rate: f64,
}

/// Flags a missing-file rate above `secondary_threshold` or an efficiency
/// ratio below `alert_threshold`.
pub struct ContextWindowDetector;

impl Detector for ContextWindowDetector {
    type Sample = ContextBuildSample;
    type Stats = ContextWindowStats;

    const KIND: IssueKind = IssueKind::ContextWindowInefficiency;

    fn evaluate(
        history: &HistoryBuffer<ContextBuildSample>,
        config: &DetectorConfig,
    ) -> Verdict<ContextWindowStats> {
        let successes = history.values().filter(|s| s.success).count() as f64;
        let tokens: u64 = history.values().map(|s| s.tokens_used).sum();
        let requested: u64 = history.values().map(|s| u64::from(s.files_requested)).sum();
        let missing: u64 = history.values().map(|s| u64::from(s.files_missing)).sum();

        let success_rate = fraction(history.values(), |s| s.success);
        let tokens_per_success = ratio(tokens as f64 / 1000.0, successes);
        let efficiency_ratio = if tokens_per_success > 0.0 {
            success_rate / tokens_per_success
        } else {
            success_rate
        };
        let missing_file_rate = ratio(missing as f64, requested as f64);

        let stats = ContextWindowStats {
            success_rate,
            tokens_per_success,
            efficiency_ratio,
            missing_file_rate,
        };

        if missing_file_rate > config.secondary_threshold {
            Verdict {
                detected: true,
                reason: format!(
                    "missing file rate {missing_file_rate:.2} above {:.2}",
                    config.secondary_threshold
                ),
                value: missing_file_rate,
                stats,
            }
        } else if efficiency_ratio < config.alert_threshold {
            Verdict {
                detected: true,
                reason: format!(
                    "efficiency ratio {efficiency_ratio:.3} below {:.3}",
                    config.alert_threshold
                ),
                value: efficiency_ratio,
                stats,
            }
        } else {
            Verdict::clear(stats)
        }
    }
}
