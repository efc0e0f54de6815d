use serde::{Deserialize, Serialize};

use super::{fraction, Detector};
use crate::domain::models::{DetectorConfig, HistoryBuffer, IssueKind, PatternSample, Verdict};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatternLearningStats {
    pub match_rate: f64,
    /// Applied matches over matches; 1.0 when nothing matched.
    pub match_to_application_rate: f64,
    pub recurring_pattern_rate: f64,
}

/// Flags learned patterns that match but are not applied, or failure patterns
/// that keep recurring after being learned.
pub struct PatternLearningDetector;

impl Detector for PatternLearningDetector {
    type Sample = PatternSample;
    type Stats = PatternLearningStats;

    const KIND: IssueKind = IssueKind::PatternLearningInefficacy;

    fn evaluate(
        history: &HistoryBuffer<PatternSample>,
        config: &DetectorConfig,
    ) -> Verdict<PatternLearningStats> {
        let matched = history.values().filter(|s| s.matched).count();
        let match_to_application_rate = if matched == 0 {
            1.0
        } else {
            fraction(history.values().filter(|s| s.matched), |s| s.applied)
        };

        let stats = PatternLearningStats {
            match_rate: fraction(history.values(), |s| s.matched),
            match_to_application_rate,
            recurring_pattern_rate: fraction(history.values(), |s| s.recurring),
        };

        if stats.match_to_application_rate < config.alert_threshold {
            Verdict {
                detected: true,
                reason: format!(
                    "only {:.0}% of matched patterns were applied",
                    stats.match_to_application_rate * 100.0
                ),
                value: stats.match_to_application_rate,
                stats,
            }
        } else if stats.recurring_pattern_rate > config.secondary_threshold {
            Verdict {
                detected: true,
                reason: format!(
                    "recurring pattern rate {:.2} above {:.2}",
                    stats.recurring_pattern_rate, config.secondary_threshold
                ),
                value: stats.recurring_pattern_rate,
                stats,
            }
        } else {
            Verdict::clear(stats)
        }
    }
}
