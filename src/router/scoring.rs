//! The four scoring axes and the weights that combine them.
//!
//! Every function here is pure: inputs in, a number in `[0, 1]` out.

use serde::Serialize;

use super::complexity::ComplexityScore;
use super::constraints::Priority;
use super::performance::ProviderPerformance;
use crate::registry::{ProviderRecord, Tier};

/// Floor applied to a complexity dimension before dividing by it.
const MIN_DEMAND: f64 = 0.1;
/// Response time (seconds) at which the latency part of the performance score hits zero.
const RESPONSE_TIME_CEILING: f64 = 10.0;
/// Cost per 1k tokens at which the cost score hits zero.
const COST_CEILING: f64 = 0.01;
/// Rate limit at which a provider earns the full rate-limit factor.
const RPM_CEILING: f64 = 1000.0;

/// Assumed capability of a tier on each complexity dimension.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TierCapability {
    pub reasoning: f64,
    pub knowledge: f64,
    pub computation: f64,
    pub coordination: f64,
}

impl TierCapability {
    pub fn for_tier(tier: Tier) -> Self {
        match tier {
            Tier::Official => Self {
                reasoning: 0.9,
                knowledge: 0.95,
                computation: 0.85,
                coordination: 0.8,
            },
            Tier::Community => Self {
                reasoning: 0.7,
                knowledge: 0.75,
                computation: 0.8,
                coordination: 0.6,
            },
            Tier::Unofficial => Self {
                reasoning: 0.5,
                knowledge: 0.6,
                computation: 0.7,
                coordination: 0.4,
            },
        }
    }
}

fn tier_reliability(tier: Tier) -> f64 {
    match tier {
        Tier::Official => 0.95,
        Tier::Community => 0.8,
        Tier::Unofficial => 0.6,
    }
}

/// Relative weight of each axis in the total score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Weights {
    pub capability: f64,
    pub performance: f64,
    pub cost: f64,
    pub reliability: f64,
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            capability: 0.35,
            performance: 0.25,
            cost: 0.25,
            reliability: 0.15,
        }
    }
}

impl Weights {
    /// Default weights with the caller's priority applied on top.
    pub fn for_priority(priority: Option<Priority>) -> Self {
        let base = Self::default();
        match priority {
            None => base,
            Some(Priority::Cost) => Self {
                cost: 0.40,
                capability: 0.25,
                ..base
            },
            Some(Priority::Performance) => Self {
                performance: 0.40,
                cost: 0.15,
                ..base
            },
            Some(Priority::Quality) => Self {
                capability: 0.50,
                cost: 0.15,
                ..base
            },
        }
    }
}

/// How well a tier's capability covers the request's demand, weighted per dimension.
pub fn capability_score(tier: Tier, complexity: &ComplexityScore) -> f64 {
    let cap = TierCapability::for_tier(tier);
    let fit = |capability: f64, demand: f64| (capability / demand.max(MIN_DEMAND)).min(1.0);

    fit(cap.reasoning, complexity.reasoning) * 0.30
        + fit(cap.knowledge, complexity.knowledge) * 0.30
        + fit(cap.computation, complexity.computation) * 0.25
        + fit(cap.coordination, complexity.coordination) * 0.15
}

pub fn performance_score(perf: &ProviderPerformance) -> f64 {
    let latency = (1.0 - perf.avg_response_time / RESPONSE_TIME_CEILING).max(0.0);
    latency * 0.4 + perf.success_rate * 0.4 + perf.avg_cost_efficiency * 0.2
}

/// Cheaper is better; free providers score 1.0 before any budget weighting.
pub fn cost_score(cost_per_1k: f64, budget_weight: Option<f64>) -> f64 {
    let score = (1.0 - cost_per_1k / COST_CEILING).max(0.0);
    match budget_weight {
        Some(weight) => score * weight,
        None => score,
    }
}

pub fn reliability_score(provider: &ProviderRecord) -> f64 {
    let rpm = (provider.max_requests_per_minute.max(0) as f64 / RPM_CEILING).min(1.0);
    tier_reliability(provider.tier) * provider.health_score * (0.8 + 0.2 * rpm)
}

/// Per-axis scores and their weighted total.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub capability: f64,
    pub performance: f64,
    pub cost: f64,
    pub reliability: f64,
    pub total: f64,
}

impl ScoreBreakdown {
    pub fn compute(
        provider: &ProviderRecord,
        perf: &ProviderPerformance,
        complexity: &ComplexityScore,
        weights: &Weights,
        budget_weight: Option<f64>,
    ) -> Self {
        let capability = capability_score(provider.tier, complexity);
        let performance = performance_score(perf);
        let cost = cost_score(provider.cost_per_1k_tokens, budget_weight);
        let reliability = reliability_score(provider);

        let total = capability * weights.capability
            + performance * weights.performance
            + cost * weights.cost
            + reliability * weights.reliability;

        Self {
            capability,
            performance,
            cost,
            reliability,
            total,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::tests::record;

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-9,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn test_default_weights_sum_to_one() {
        let w = Weights::default();
        assert_close(w.capability + w.performance + w.cost + w.reliability, 1.0);
    }

    #[test]
    fn test_priority_overrides() {
        let cost = Weights::for_priority(Some(Priority::Cost));
        assert_eq!(cost.cost, 0.40);
        assert_eq!(cost.capability, 0.25);
        assert_eq!(cost.performance, 0.25);
        assert_eq!(cost.reliability, 0.15);

        let perf = Weights::for_priority(Some(Priority::Performance));
        assert_eq!(perf.performance, 0.40);
        assert_eq!(perf.cost, 0.15);
        assert_eq!(perf.capability, 0.35);

        let quality = Weights::for_priority(Some(Priority::Quality));
        assert_eq!(quality.capability, 0.50);
        assert_eq!(quality.cost, 0.15);
        assert_eq!(quality.performance, 0.25);

        assert_eq!(Weights::for_priority(None), Weights::default());
    }

    #[test]
    fn test_capability_saturates_for_easy_requests() {
        let easy = ComplexityScore::new(0.0, 0.0, 0.0, 0.0);
        for tier in Tier::ALL {
            assert_close(capability_score(tier, &easy), 1.0);
        }
    }

    #[test]
    fn test_capability_penalises_underqualified_tiers() {
        let hard = ComplexityScore::new(1.0, 1.0, 1.0, 1.0);
        let official = capability_score(Tier::Official, &hard);
        let community = capability_score(Tier::Community, &hard);
        let unofficial = capability_score(Tier::Unofficial, &hard);

        assert_close(official, 0.9 * 0.30 + 0.95 * 0.30 + 0.85 * 0.25 + 0.8 * 0.15);
        assert!(official > community);
        assert!(community > unofficial);
    }

    #[test]
    fn test_performance_score_neutral_and_floored() {
        let neutral = ProviderPerformance::default();
        assert_close(performance_score(&neutral), 0.9 * 0.4 + 0.4 + 0.2);

        let slow = ProviderPerformance {
            avg_response_time: 25.0,
            success_rate: 0.5,
            avg_cost_efficiency: 0.0,
            ..Default::default()
        };
        assert_close(performance_score(&slow), 0.2);
    }

    #[test]
    fn test_cost_score_strictly_decreasing() {
        let costs = [0.0, 0.00005, 0.0001, 0.001, 0.005, 0.0099];
        for pair in costs.windows(2) {
            assert!(cost_score(pair[0], None) > cost_score(pair[1], None));
        }
        assert_eq!(cost_score(0.02, None), 0.0);
        assert_close(cost_score(0.0, Some(0.5)), 0.5);
    }

    #[test]
    fn test_reliability_score() {
        let mut provider = record("alpha", Tier::Official);
        provider.max_requests_per_minute = 1000;
        assert_close(reliability_score(&provider), 0.95);

        provider.max_requests_per_minute = 5000;
        provider.health_score = 0.5;
        assert_close(reliability_score(&provider), 0.475);

        let mut community = record("beta", Tier::Community);
        community.max_requests_per_minute = 0;
        assert_close(reliability_score(&community), 0.8 * 0.8);
    }

    #[test]
    fn test_higher_cost_never_raises_total() {
        let complexity = ComplexityScore::new(0.2, 0.2, 0.2, 0.2);
        let perf = ProviderPerformance::default();
        let weights = Weights::default();

        let mut cheap = record("alpha", Tier::Community);
        cheap.cost_per_1k_tokens = 0.001;
        let mut pricey = cheap.clone();
        pricey.cost_per_1k_tokens = 0.004;

        let a = ScoreBreakdown::compute(&cheap, &perf, &complexity, &weights, None);
        let b = ScoreBreakdown::compute(&pricey, &perf, &complexity, &weights, None);
        assert!(a.cost > b.cost);
        assert!(a.total > b.total);
        assert_eq!(a.capability, b.capability);
        assert_eq!(a.reliability, b.reliability);
    }
}
