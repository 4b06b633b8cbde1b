//! Request cost estimation.

use serde::Serialize;

use crate::registry::ProviderRecord;

/// Cost per 1k tokens at which a request is considered zero-efficiency.
const EFFICIENCY_COST_CEILING: f64 = 0.01;

/// USD per 1k tokens, as (model, input, output).
const RATE_TABLE: &[(&str, f64, f64)] = &[
    ("gpt-3.5-turbo", 0.002, 0.002),
    ("gpt-4", 0.03, 0.06),
    ("gpt-4-turbo", 0.01, 0.03),
    ("claude-3-5-sonnet", 0.003, 0.015),
    ("claude-3-haiku", 0.00025, 0.00125),
    ("command", 0.001, 0.002),
    ("command-light", 0.0005, 0.001),
    ("llama-2-7b-chat", 0.0002, 0.0002),
    ("mixtral-8x7b", 0.0002, 0.0002),
    ("llama2", 0.0, 0.0),
    ("codellama", 0.0, 0.0),
    ("mistral", 0.0, 0.0),
];

/// Approximate token count: about four characters per token, at least one
/// for any non-empty text.
pub fn estimate_tokens(text: &str) -> u64 {
    let chars = text.chars().count() as u64;
    if chars == 0 {
        0
    } else {
        (chars / 4).max(1)
    }
}

/// Estimated cost of one request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CostBreakdown {
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub input_cost: f64,
    pub output_cost: f64,
    pub total_cost: f64,
    pub provider: String,
}

impl CostBreakdown {
    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }

    /// Cost efficiency in `[0, 1]` for the performance tracker. Free or
    /// empty requests are fully efficient; an unknowable cost is not.
    pub fn efficiency(&self) -> f64 {
        let tokens = self.total_tokens();
        if tokens == 0 {
            return 1.0;
        }
        let per_1k = self.total_cost / tokens as f64 * 1000.0;
        if !per_1k.is_finite() {
            return 0.0;
        }
        (1.0 - per_1k / EFFICIENCY_COST_CEILING).clamp(0.0, 1.0)
    }
}

pub trait CostEstimator: Send + Sync {
    fn estimate(
        &self,
        provider: &ProviderRecord,
        model: &str,
        prompt: &str,
        completion: &str,
    ) -> CostBreakdown;
}

/// Looks a model up in a fixed per-model rate table and falls back to the
/// provider's flat `cost_per_1k_tokens` for anything unknown.
#[derive(Debug, Clone, Copy, Default)]
pub struct RateTableEstimator;

impl RateTableEstimator {
    /// (input, output) USD per 1k tokens for a known model.
    ///
    /// Matches case-insensitively; namespaced or suffixed names such as
    /// `meta-llama/llama-2-7b-chat-hf` resolve to the longest table entry
    /// they contain.
    pub fn rates_for(model: &str) -> Option<(f64, f64)> {
        let model = model.to_lowercase();
        if let Some(&(_, input, output)) = RATE_TABLE.iter().find(|(name, _, _)| *name == model) {
            return Some((input, output));
        }
        RATE_TABLE
            .iter()
            .filter(|(name, _, _)| model.contains(name))
            .max_by_key(|(name, _, _)| name.len())
            .map(|&(_, input, output)| (input, output))
    }
}

impl CostEstimator for RateTableEstimator {
    fn estimate(
        &self,
        provider: &ProviderRecord,
        model: &str,
        prompt: &str,
        completion: &str,
    ) -> CostBreakdown {
        let (input_rate, output_rate) = Self::rates_for(model)
            .unwrap_or((provider.cost_per_1k_tokens, provider.cost_per_1k_tokens));

        let input_tokens = estimate_tokens(prompt);
        let output_tokens = estimate_tokens(completion);
        let input_cost = input_tokens as f64 / 1000.0 * input_rate;
        let output_cost = output_tokens as f64 / 1000.0 * output_rate;

        CostBreakdown {
            model: model.to_string(),
            input_tokens,
            output_tokens,
            input_cost,
            output_cost,
            total_cost: input_cost + output_cost,
            provider: provider.name.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::tests::record;
    use crate::registry::Tier;

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-12,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn test_estimate_tokens() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("hi"), 1);
        assert_eq!(estimate_tokens("abcdefgh"), 2);
        assert_eq!(estimate_tokens(&"x".repeat(4000)), 1000);
    }

    #[test]
    fn test_rates_for_known_models() {
        assert_eq!(RateTableEstimator::rates_for("gpt-4"), Some((0.03, 0.06)));
        assert_eq!(RateTableEstimator::rates_for("GPT-4-Turbo"), Some((0.01, 0.03)));
        assert_eq!(
            RateTableEstimator::rates_for("gpt-4-turbo-preview"),
            Some((0.01, 0.03))
        );
        assert_eq!(
            RateTableEstimator::rates_for("mistralai/mixtral-8x7b-instruct-v0.1"),
            Some((0.0002, 0.0002))
        );
        assert_eq!(
            RateTableEstimator::rates_for("command-light"),
            Some((0.0005, 0.001))
        );
        assert_eq!(RateTableEstimator::rates_for("some-new-model"), None);
    }

    #[test]
    fn test_estimate_uses_rate_table() {
        let provider = record("openai", Tier::Official);
        let breakdown =
            RateTableEstimator.estimate(&provider, "gpt-4", &"a".repeat(4000), &"b".repeat(2000));

        assert_eq!(breakdown.input_tokens, 1000);
        assert_eq!(breakdown.output_tokens, 500);
        assert_close(breakdown.input_cost, 0.03);
        assert_close(breakdown.output_cost, 0.03);
        assert_close(breakdown.total_cost, 0.06);
        assert_eq!(breakdown.provider, "openai");
        assert_eq!(breakdown.efficiency(), 0.0);
    }

    #[test]
    fn test_estimate_falls_back_to_provider_rate() {
        let mut provider = record("local", Tier::Unofficial);
        provider.cost_per_1k_tokens = 0.001;
        let breakdown =
            RateTableEstimator.estimate(&provider, "house-model", &"a".repeat(4000), "");

        assert_eq!(breakdown.output_tokens, 0);
        assert_close(breakdown.total_cost, 0.001);
        assert_close(breakdown.efficiency(), 0.9);
    }

    #[test]
    fn test_free_model_is_fully_efficient() {
        let provider = record("ollama", Tier::Unofficial);
        let breakdown = RateTableEstimator.estimate(&provider, "llama2", "hello there", "hi");
        assert_eq!(breakdown.total_cost, 0.0);
        assert_eq!(breakdown.efficiency(), 1.0);
    }

    #[test]
    fn test_nan_provider_rate_is_least_efficient() {
        let mut provider = record("broken", Tier::Unofficial);
        provider.cost_per_1k_tokens = f64::NAN;
        let breakdown = RateTableEstimator.estimate(&provider, "house-model", "hello there", "hi");
        assert!(breakdown.total_cost.is_nan());
        assert_eq!(breakdown.efficiency(), 0.0);
    }
}
