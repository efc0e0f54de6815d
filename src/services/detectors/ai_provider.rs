use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{fraction, mean, ratio, Detector};
use crate::domain::models::{DetectorConfig, HistoryBuffer, IssueKind, ProviderSample, Verdict};

/// Per-provider error breakdown, keyed `provider/model`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderBreakdown {
    pub samples: u64,
    pub errors: u64,
    pub timeouts: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderStats {
    pub error_rate: f64,
    pub timeout_rate: f64,
    pub avg_latency_ms: f64,
    pub first_half_quality: f64,
    pub second_half_quality: f64,
    /// `second_half_quality - first_half_quality`; negative means degradation.
    pub quality_trend: f64,
    pub by_model: BTreeMap<String, ProviderBreakdown>,
}

/// Flags error or timeout rates above `alert_threshold`, or a quality drop
/// larger than `secondary_threshold`.
pub struct AiProviderDetector;

impl Detector for AiProviderDetector {
    type Sample = ProviderSample;
    type Stats = ProviderStats;

    const KIND: IssueKind = IssueKind::AiProviderInstability;

    fn evaluate(
        history: &HistoryBuffer<ProviderSample>,
        config: &DetectorConfig,
    ) -> Verdict<ProviderStats> {
        let (first, second) = history.halves();
        let first_half_quality = mean(first, |s| s.quality);
        let second_half_quality = mean(second, |s| s.quality);

        let mut by_model: BTreeMap<String, ProviderBreakdown> = BTreeMap::new();
        for sample in history.values() {
            let entry = by_model
                .entry(format!("{}/{}", sample.provider, sample.model))
                .or_default();
            entry.samples += 1;
            entry.errors += u64::from(sample.error);
            entry.timeouts += u64::from(sample.timeout);
        }

        let stats = ProviderStats {
            error_rate: fraction(history.values(), |s| s.error),
            timeout_rate: fraction(history.values(), |s| s.timeout),
            avg_latency_ms: mean(history.values(), |s| s.latency_ms),
            first_half_quality,
            second_half_quality,
            quality_trend: second_half_quality - first_half_quality,
            by_model,
        };

        let threshold = config.alert_threshold;
        if stats.error_rate > threshold {
            let worst = worst_model(&stats.by_model, |b| b.errors);
            Verdict {
                detected: true,
                reason: format!("error rate {:.2} above {threshold:.2}{worst}", stats.error_rate),
                value: stats.error_rate,
                stats,
            }
        } else if stats.timeout_rate > threshold {
            let worst = worst_model(&stats.by_model, |b| b.timeouts);
            Verdict {
                detected: true,
                reason: format!(
                    "timeout rate {:.2} above {threshold:.2}{worst}",
                    stats.timeout_rate
                ),
                value: stats.timeout_rate,
                stats,
            }
        } else if stats.quality_trend < -config.secondary_threshold {
            Verdict {
                detected: true,
                reason: format!(
                    "response quality fell from {first_half_quality:.2} to {second_half_quality:.2}"
                ),
                value: stats.quality_trend,
                stats,
            }
        } else {
            Verdict::clear(stats)
        }
    }
}

/// `" (worst: provider/model at 40%)"` or empty.
fn worst_model(
    by_model: &BTreeMap<String, ProviderBreakdown>,
    count: impl Fn(&ProviderBreakdown) -> u64,
) -> String {
    by_model
        .iter()
        .map(|(key, b)| (key, ratio(count(b) as f64, b.samples as f64)))
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .filter(|(_, rate)| *rate > 0.0)
        .map(|(key, rate)| format!(" (worst: {key} at {:.0}%)", rate * 100.0))
        .unwrap_or_default()
}
