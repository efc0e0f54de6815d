use serde::{Deserialize, Serialize};

use super::{fraction, Detector};
use crate::domain::models::{CodeGenSample, DetectorConfig, HistoryBuffer, IssueKind, Verdict};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CodeGenerationStats {
    pub success_rate: f64,
    pub first_half_rate: f64,
    pub second_half_rate: f64,
    /// `second_half_rate - first_half_rate`; negative means degradation.
    pub trend: f64,
    pub test_pass_rate: f64,
}

/// Flags a success-rate trend whose magnitude exceeds `alert_threshold`.
pub struct CodeGenerationDetector;

impl Detector for CodeGenerationDetector {
    type Sample = CodeGenSample;
    type Stats = CodeGenerationStats;

    const KIND: IssueKind = IssueKind::CodeGenerationDegradation;

    fn evaluate(
        history: &HistoryBuffer<CodeGenSample>,
        config: &DetectorConfig,
    ) -> Verdict<CodeGenerationStats> {
        let (first, second) = history.halves();
        let first_half_rate = fraction(first, |s| s.success);
        let second_half_rate = fraction(second, |s| s.success);
        let trend = second_half_rate - first_half_rate;

        let stats = CodeGenerationStats {
            success_rate: fraction(history.values(), |s| s.success),
            first_half_rate,
            second_half_rate,
            trend,
            test_pass_rate: fraction(history.values(), |s| s.test_passed),
        };

        if trend.abs() > config.alert_threshold {
            Verdict {
                detected: true,
                reason: format!(
                    "success rate moved from {first_half_rate:.2} to {second_half_rate:.2}"
                ),
                value: trend,
                stats,
            }
        } else {
            Verdict::clear(stats)
        }
    }
}
