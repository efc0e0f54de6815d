/// Pricing collaborator that turns raw token counts into a cost.
///
/// Returns `None` for models it cannot price. Any
/// `Fn(provider, model, input, output) -> Option<f64>` closure is a provider.
pub trait PricingProvider: Send + Sync {
    fn cost(&self, provider: &str, model: &str, input_tokens: u64, output_tokens: u64)
        -> Option<f64>;
}

impl<F> PricingProvider for F
where
    F: Fn(&str, &str, u64, u64) -> Option<f64> + Send + Sync,
{
    fn cost(
        &self,
        provider: &str,
        model: &str,
        input_tokens: u64,
        output_tokens: u64,
    ) -> Option<f64> {
        self(provider, model, input_tokens, output_tokens)
    }
}
