//! Model-aware token pricing.
//!
//! [`StaticPricing`] is the default [`PricingProvider`]: a table of USD prices
//! per million tokens matched by model-name substring, so "opus" prices
//! "claude-opus-4-6-20250616".

use crate::domain::models::TokenTotals;
use crate::domain::ports::PricingProvider;

/// Pricing per million tokens for a specific model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelPricing {
    /// Cost per million input tokens (USD).
    pub input: f64,
    /// Cost per million output tokens (USD).
    pub output: f64,
}

impl ModelPricing {
    pub const fn new(input: f64, output: f64) -> Self {
        Self { input, output }
    }

    /// Cost in USD for the given token counts.
    pub fn cost(&self, input_tokens: u64, output_tokens: u64) -> f64 {
        (input_tokens as f64 * self.input + output_tokens as f64 * self.output) / 1_000_000.0
    }
}

/// Known model pricing table (costs in USD per million tokens).
const PRICING_TABLE: &[(&str, ModelPricing)] = &[
    ("opus", ModelPricing::new(15.0, 75.0)),
    ("sonnet", ModelPricing::new(3.0, 15.0)),
    ("haiku", ModelPricing::new(0.80, 4.0)),
    ("gpt-4o-mini", ModelPricing::new(0.15, 0.60)),
    ("gpt-4o", ModelPricing::new(2.50, 10.0)),
];

/// Substring-matched pricing table; the first matching entry wins.
#[derive(Debug, Clone)]
pub struct StaticPricing {
    entries: Vec<(String, ModelPricing)>,
}

impl StaticPricing {
    /// An empty table that prices nothing.
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Add an entry ahead of the existing ones.
    pub fn with_model(mut self, name: impl Into<String>, pricing: ModelPricing) -> Self {
        self.entries.insert(0, (name.into().to_lowercase(), pricing));
        self
    }

    /// Get pricing for a model by name or alias.
    pub fn get(&self, model: &str) -> Option<ModelPricing> {
        let model_lower = model.to_lowercase();
        self.entries
            .iter()
            .find(|(name, _)| model_lower.contains(name.as_str()))
            .map(|(_, pricing)| *pricing)
    }
}

impl Default for StaticPricing {
    fn default() -> Self {
        Self {
            entries: PRICING_TABLE
                .iter()
                .map(|(name, pricing)| ((*name).to_string(), *pricing))
                .collect(),
        }
    }
}

impl PricingProvider for StaticPricing {
    fn cost(&self, _provider: &str, model: &str, input_tokens: u64, output_tokens: u64) -> Option<f64> {
        self.get(model).map(|pricing| pricing.cost(input_tokens, output_tokens))
    }
}

/// Estimate cost in USD using the default table.
pub fn estimate_cost(model: &str, input_tokens: u64, output_tokens: u64) -> Option<f64> {
    StaticPricing::default().cost("", model, input_tokens, output_tokens)
}

/// Format token totals as a human-readable summary.
pub fn format_summary(tokens: &TokenTotals) -> String {
    let mut s = format!(
        "Cost: ${:.4} ({}K input, {}K output)",
        tokens.cost,
        tokens.input / 1000,
        tokens.output / 1000,
    );

    if tokens.by_model.len() > 1 {
        s.push_str("\n  By model:");
        let mut models: Vec<_> = tokens.by_model.iter().collect();
        models.sort_by(|a, b| b.1.cost.total_cmp(&a.1.cost).then_with(|| a.0.cmp(b.0)));
        for (key, entry) in models {
            s.push_str(&format!(
                "\n    {key}: ${:.4} ({} in / {} out)",
                entry.cost, entry.input, entry.output
            ));
        }
    }

    s
}
