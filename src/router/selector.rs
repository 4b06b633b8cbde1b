//! Provider selection logic.

use std::cmp::Ordering;
use std::sync::Arc;

use super::complexity::ComplexityScore;
use super::constraints::{Constraints, RequestContext};
use super::performance::PerformanceTracker;
use super::scoring::{ScoreBreakdown, Weights};
use crate::registry::{ProviderRecord, ProviderRegistry};

/// Providers below this health score are never routed to.
pub const MIN_HEALTH: f64 = 0.1;

/// A candidate provider together with its scores for one request.
#[derive(Debug, Clone)]
pub struct ScoredProvider {
    pub provider: ProviderRecord,
    pub scores: ScoreBreakdown,
}

/// Scores eligible providers against a request and picks the best one.
///
/// Selection only reads the registry and tracker.
#[derive(Debug, Clone)]
pub struct Selector {
    registry: Arc<ProviderRegistry>,
    tracker: Arc<PerformanceTracker>,
}

impl Selector {
    pub fn new(registry: Arc<ProviderRegistry>, tracker: Arc<PerformanceTracker>) -> Self {
        Self { registry, tracker }
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    pub fn tracker(&self) -> &Arc<PerformanceTracker> {
        &self.tracker
    }

    /// Providers that pass the key, health, cost and constraint filters.
    pub fn eligible(&self, constraints: &Constraints) -> Vec<ProviderRecord> {
        self.registry
            .list()
            .into_iter()
            .filter(|p| !p.tier.requires_api_key() || p.has_api_key())
            .filter(|p| p.health_score >= MIN_HEALTH)
            .filter(|p| p.cost_per_1k_tokens.is_finite())
            .filter(|p| constraints.admits(p))
            .collect()
    }

    /// Every eligible provider, best first.
    ///
    /// Ties on total score go to the lower `priority`, then to the name.
    pub fn rank(
        &self,
        complexity: &ComplexityScore,
        context: &RequestContext,
        constraints: &Constraints,
    ) -> Vec<ScoredProvider> {
        let weights = Weights::for_priority(context.priority);

        let mut ranked: Vec<ScoredProvider> = self
            .eligible(constraints)
            .into_iter()
            .map(|provider| {
                let perf = self.tracker.get(&provider.name);
                let scores = ScoreBreakdown::compute(
                    &provider,
                    &perf,
                    complexity,
                    &weights,
                    constraints.budget_weight,
                );
                ScoredProvider { provider, scores }
            })
            .collect();

        ranked.sort_by(compare_candidates);
        ranked
    }

    /// Pick the top-ranked provider, with its scores.
    pub fn select_scored(
        &self,
        complexity: &ComplexityScore,
        context: &RequestContext,
        constraints: &Constraints,
    ) -> Option<ScoredProvider> {
        let ranked = self.rank(complexity, context, constraints);
        let candidates = ranked.len();

        match ranked.into_iter().next() {
            Some(best) => {
                tracing::info!(
                    provider = %best.provider.name,
                    tier = %best.provider.tier,
                    score = best.scores.total,
                    candidates,
                    complexity = complexity.total_score(),
                    "Selected provider"
                );
                Some(best)
            }
            None => {
                tracing::warn!(
                    complexity = complexity.total_score(),
                    ?constraints,
                    "No eligible provider for request"
                );
                None
            }
        }
    }

    /// Pick the top-ranked provider. `None` means nothing is eligible.
    pub fn select(
        &self,
        complexity: &ComplexityScore,
        context: &RequestContext,
        constraints: &Constraints,
    ) -> Option<ProviderRecord> {
        self.select_scored(complexity, context, constraints)
            .map(|scored| scored.provider)
    }
}

/// Orderable total: a non-finite score sorts below every real one.
fn rank_key(scored: &ScoredProvider) -> f64 {
    if scored.scores.total.is_finite() {
        scored.scores.total
    } else {
        f64::NEG_INFINITY
    }
}

fn compare_candidates(a: &ScoredProvider, b: &ScoredProvider) -> Ordering {
    rank_key(b)
        .total_cmp(&rank_key(a))
        .then_with(|| a.provider.priority.cmp(&b.provider.priority))
        .then_with(|| a.provider.key().cmp(&b.provider.key()))
}
