//! Caller-supplied selection context and hard constraints.
//!
//! Both arrive as free-form JSON maps. Each field is read on its own: a value
//! of the wrong type or out of range is dropped with a debug log and the rest
//! of the map still applies.

use serde_json::{Map, Value};

use super::complexity::{ComplexityHint, Domain};
use crate::registry::{ProviderRecord, Tier};

/// What the caller wants the selection weighted toward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    Cost,
    Performance,
    Quality,
}

impl Priority {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cost" => Some(Self::Cost),
            "performance" => Some(Self::Performance),
            "quality" => Some(Self::Quality),
            _ => None,
        }
    }
}

/// Soft hints that shape analysis and weighting.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestContext {
    pub priority: Option<Priority>,
    pub complexity_hint: Option<ComplexityHint>,
    pub domain: Option<Domain>,
}

impl RequestContext {
    /// Read the recognised keys of a context map; other keys are ignored.
    pub fn from_map(map: &Map<String, Value>) -> Self {
        Self {
            priority: string_field(map, "priority", Priority::parse),
            complexity_hint: string_field(map, "complexity_hint", ComplexityHint::parse),
            domain: string_field(map, "domain", Domain::parse),
        }
    }
}

/// Hard filters applied before scoring.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Constraints {
    pub max_cost_per_1k: Option<f64>,
    /// Upper bound on a provider's configured timeout, in seconds.
    pub max_timeout: Option<f64>,
    pub allowed_tiers: Option<Vec<Tier>>,
    pub required_model: Option<String>,
    /// Multiplier on the cost axis score.
    pub budget_weight: Option<f64>,
}

impl Constraints {
    pub fn from_map(map: &Map<String, Value>) -> Self {
        Self {
            max_cost_per_1k: number_field(map, "max_cost_per_1k", |v| v >= 0.0),
            max_timeout: number_field(map, "max_timeout", |v| v > 0.0),
            allowed_tiers: tiers_field(map),
            required_model: string_field(map, "required_model", |s| {
                let trimmed = s.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            }),
            budget_weight: number_field(map, "budget_weight", |v| v >= 0.0),
        }
    }

    /// Whether `provider` passes every constraint that is set.
    pub fn admits(&self, provider: &ProviderRecord) -> bool {
        if let Some(max_cost) = self.max_cost_per_1k {
            if provider.cost_per_1k_tokens > max_cost {
                return false;
            }
        }

        if let Some(max_timeout) = self.max_timeout {
            if provider.timeout as f64 > max_timeout {
                return false;
            }
        }

        if let Some(tiers) = &self.allowed_tiers {
            if !tiers.contains(&provider.tier) {
                return false;
            }
        }

        if let Some(model) = &self.required_model {
            if !provider.supports_model(model) {
                return false;
            }
        }

        true
    }
}

fn string_field<T>(
    map: &Map<String, Value>,
    key: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> Option<T> {
    let value = map.get(key)?;
    let parsed = value.as_str().and_then(parse);
    if parsed.is_none() && !value.is_null() {
        tracing::debug!(field = key, value = %value, "Ignoring unrecognised value");
    }
    parsed
}

fn number_field(
    map: &Map<String, Value>,
    key: &str,
    valid: impl Fn(f64) -> bool,
) -> Option<f64> {
    let value = map.get(key)?;
    let parsed = value
        .as_f64()
        .filter(|v| v.is_finite() && valid(*v));
    if parsed.is_none() && !value.is_null() {
        tracing::debug!(field = key, value = %value, "Ignoring malformed constraint");
    }
    parsed
}

/// `allowed_tiers` may be a list or a single string. Unknown names are
/// dropped; if none remain the constraint is treated as absent.
fn tiers_field(map: &Map<String, Value>) -> Option<Vec<Tier>> {
    let value = map.get("allowed_tiers")?;
    let names: Vec<&str> = match value {
        Value::String(s) => vec![s.as_str()],
        Value::Array(items) => items.iter().filter_map(Value::as_str).collect(),
        _ => Vec::new(),
    };

    let mut tiers: Vec<Tier> = names.into_iter().filter_map(Tier::parse).collect();
    tiers.sort();
    tiers.dedup();

    if tiers.is_empty() {
        if !value.is_null() {
            tracing::debug!(value = %value, "Ignoring allowed_tiers with no recognised tier");
        }
        None
    } else {
        Some(tiers)
    }
}
