//! Trend/threshold detectors.
//!
//! Each detector is a pure evaluation over a [`HistoryBuffer`]; [`check`]
//! wraps it with the minimum-sample gate and folds the verdict into the
//! detector's [`IssueState`].

pub mod ai_provider;
pub mod code_generation;
pub mod context_window;
pub mod pattern_learning;
pub mod schema_validation;
pub mod test_generation;
pub mod validation_gate;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use crate::domain::models::{DetectorConfig, HistoryBuffer, IssueKind, IssueState, Verdict};

pub use ai_provider::{AiProviderDetector, ProviderBreakdown, ProviderStats};
pub use code_generation::{CodeGenerationDetector, CodeGenerationStats};
pub use context_window::{ContextWindowDetector, ContextWindowStats};
pub use pattern_learning::{PatternLearningDetector, PatternLearningStats};
pub use schema_validation::{SchemaValidationDetector, SchemaValidationStats};
pub use test_generation::{TestGenerationDetector, TestGenerationStats};
pub use validation_gate::{ValidationGateDetector, ValidationGateStats};

/// A stateless evaluation of one issue type.
pub trait Detector {
    type Sample;
    type Stats: Default + Clone + Serialize;

    const KIND: IssueKind;

    /// Compute statistics over the whole buffer and decide whether the issue
    /// is present. Callers guarantee the buffer passed the sample gate.
    fn evaluate(
        history: &HistoryBuffer<Self::Sample>,
        config: &DetectorConfig,
    ) -> Verdict<Self::Stats>;
}

/// Re-evaluate a detector and return the next state plus whether an alert
/// must be published.
///
/// Below `min_samples` total, or `min_recent_samples` inside the recency
/// window, the previous detection and statistics are kept and no alert fires.
pub fn check<D: Detector>(
    history: &HistoryBuffer<D::Sample>,
    state: &IssueState<D::Stats>,
    config: &DetectorConfig,
    now: DateTime<Utc>,
) -> (IssueState<D::Stats>, bool) {
    let mut next = state.clone();
    next.sample_count = history.len();
    next.alert_threshold = config.alert_threshold;

    if !config.enabled {
        return (next, false);
    }
    let recent = history.count_since(now - config.recency_window());
    if history.len() < config.min_samples || recent < config.min_recent_samples {
        debug!(
            detector = %D::KIND,
            samples = history.len(),
            recent,
            "not enough samples to evaluate"
        );
        return (next, false);
    }

    let verdict = D::evaluate(history, config);
    if verdict.detected && !state.detected {
        warn!(detector = %D::KIND, value = verdict.value, reason = %verdict.reason, "issue detected");
    }
    let fired = next.apply(verdict, now);
    (next, fired)
}

/// Fraction of `items` matching `pred`; 0 for an empty input.
pub(crate) fn fraction<'a, T: 'a>(
    items: impl IntoIterator<Item = &'a T>,
    pred: impl Fn(&T) -> bool,
) -> f64 {
    let (hits, total) = items
        .into_iter()
        .fold((0usize, 0usize), |(hits, total), item| {
            (hits + usize::from(pred(item)), total + 1)
        });
    ratio(hits as f64, total as f64)
}

/// Arithmetic mean of the projected values; 0 for an empty input.
pub(crate) fn mean<'a, T: 'a>(
    items: impl IntoIterator<Item = &'a T>,
    value: impl Fn(&T) -> f64,
) -> f64 {
    let (sum, count) = items
        .into_iter()
        .fold((0.0, 0usize), |(sum, count), item| (sum + value(item), count + 1));
    ratio(sum, count as f64)
}

pub(crate) fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}
