//! Provider registry: immutable provider capability records plus their
//! mutable health state.
//!
//! Records are loaded at startup (see [`crate::config`]) and keyed by
//! lowercase name. After load, [`ProviderRegistry::update_health`] changes one
//! record atomically because each record lives in its own [`DashMap`] entry,
//! and [`ProviderRegistry::replace`] swaps in a reloaded provider set.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::config::ApiKey;

/// Trust/capability classification of a provider, highest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Official,
    Community,
    Unofficial,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::Official, Tier::Community, Tier::Unofficial];

    /// Parse a tier name, case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "official" => Some(Self::Official),
            "community" => Some(Self::Community),
            "unofficial" => Some(Self::Unofficial),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Official => "official",
            Tier::Community => "community",
            Tier::Unofficial => "unofficial",
        }
    }

    /// Whether providers of this tier must carry an API key to be routable.
    pub fn requires_api_key(&self) -> bool {
        !matches!(self, Tier::Unofficial)
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration and health of a single provider.
#[derive(Debug, Clone)]
pub struct ProviderRecord {
    /// Display name as written in the provider source.
    pub name: String,
    pub tier: Tier,
    pub base_url: String,
    /// `None` when the source row had no key (or an unresolved `${VAR}`).
    pub api_key: Option<ApiKey>,
    /// Supported models, in source order.
    pub models: Vec<String>,
    /// Request timeout in seconds.
    pub timeout: i64,
    pub max_requests_per_minute: i64,
    /// Approximate USD cost per 1000 tokens.
    pub cost_per_1k_tokens: f64,
    /// Lower is preferred when scores tie.
    pub priority: i32,
    /// Availability confidence in `[0, 1]`.
    pub health_score: f64,
    pub other: String,
}

impl ProviderRecord {
    /// Registry key for this provider.
    pub fn key(&self) -> String {
        self.name.to_lowercase()
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key
            .as_ref()
            .is_some_and(|k| !k.expose_secret().is_empty())
    }

    pub fn supports_model(&self, model: &str) -> bool {
        self.models.iter().any(|m| m.eq_ignore_ascii_case(model))
    }
}

/// A configuration problem found by [`ProviderRegistry::validate`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigIssue {
    #[error("Missing base URL")]
    MissingBaseUrl,
    #[error("Invalid base URL format")]
    InvalidBaseUrl,
    #[error("No models specified")]
    NoModels,
    #[error("Official provider missing API key")]
    OfficialWithoutKey,
    #[error("Invalid timeout value")]
    InvalidTimeout,
    #[error("Invalid max requests per minute")]
    InvalidRateLimit,
    #[error("Invalid cost per 1k tokens")]
    InvalidCost,
}

/// Summary counts over the registry.
#[derive(Debug, Clone, Serialize)]
pub struct RegistryStats {
    pub total: usize,
    pub by_tier: BTreeMap<String, usize>,
    pub with_api_keys: usize,
    pub average_cost_per_1k: f64,
}

/// Process-wide provider registry.
#[derive(Debug, Default)]
pub struct ProviderRegistry {
    providers: DashMap<String, ProviderRecord>,
}

impl ProviderRegistry {
    /// Build a registry from loaded records.
    ///
    /// Names are keyed case-insensitively; a later record with the same name
    /// replaces an earlier one.
    pub fn new(records: Vec<ProviderRecord>) -> Self {
        let providers = DashMap::with_capacity(records.len());
        for record in records {
            let key = record.key();
            if let Some(replaced) = providers.insert(key, record) {
                tracing::warn!(
                    provider = %replaced.name,
                    "Duplicate provider name in source, keeping the last row"
                );
            }
        }
        Self { providers }
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Look up a provider by name (case-insensitive).
    pub fn get(&self, name: &str) -> Option<ProviderRecord> {
        self.providers
            .get(&name.to_lowercase())
            .map(|entry| entry.value().clone())
    }

    /// All providers, ordered by registry key.
    pub fn list(&self) -> Vec<ProviderRecord> {
        let mut all: Vec<ProviderRecord> = self
            .providers
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        all.sort_by_key(|p| p.key());
        all
    }

    pub fn by_tier(&self, tier: Tier) -> Vec<ProviderRecord> {
        self.list().into_iter().filter(|p| p.tier == tier).collect()
    }

    pub fn with_api_key(&self) -> Vec<ProviderRecord> {
        self.list().into_iter().filter(|p| p.has_api_key()).collect()
    }

    /// Providers sorted by ascending `priority`, ties by name.
    pub fn by_priority(&self) -> Vec<ProviderRecord> {
        let mut all = self.list();
        all.sort_by_key(|p| p.priority);
        all
    }

    /// Set a provider's health score, clamped to `[0, 1]`.
    ///
    /// Returns the stored value, or `None` if the provider is unknown.
    /// A non-finite score leaves the current value in place.
    pub fn update_health(&self, name: &str, score: f64) -> Option<f64> {
        let mut entry = self.providers.get_mut(&name.to_lowercase())?;
        let record = entry.value_mut();
        if !score.is_finite() {
            tracing::warn!(provider = %record.name, score, "Ignoring non-finite health score");
            return Some(record.health_score);
        }
        let previous = record.health_score;
        record.health_score = score.clamp(0.0, 1.0);
        tracing::info!(
            provider = %record.name,
            previous,
            health_score = record.health_score,
            "Provider health updated"
        );
        Some(record.health_score)
    }

    /// Swap in a freshly loaded set of records.
    ///
    /// Providers present before and after keep their current health score;
    /// providers absent from `records` are dropped. Each record is swapped
    /// atomically; the set as a whole is not.
    pub fn replace(&self, records: Vec<ProviderRecord>) {
        let incoming: HashSet<String> = records.iter().map(ProviderRecord::key).collect();
        let before = self.providers.len();
        self.providers.retain(|key, _| incoming.contains(key));
        let removed = before - self.providers.len();

        let mut added = 0usize;
        for mut record in records {
            match self.providers.entry(record.key()) {
                Entry::Occupied(mut existing) => {
                    record.health_score = existing.get().health_score;
                    existing.insert(record);
                }
                Entry::Vacant(slot) => {
                    slot.insert(record);
                    added += 1;
                }
            }
        }

        tracing::info!(
            providers = self.providers.len(),
            added,
            removed,
            "Provider registry reloaded"
        );
    }

    /// Check every provider's configuration.
    ///
    /// Only providers with at least one problem appear in the result.
    pub fn validate(&self) -> BTreeMap<String, Vec<ConfigIssue>> {
        let mut issues = BTreeMap::new();
        for provider in self.list() {
            let found = validate_record(&provider);
            if !found.is_empty() {
                issues.insert(provider.key(), found);
            }
        }
        issues
    }

    pub fn stats(&self) -> RegistryStats {
        let all = self.list();
        let by_tier = Tier::ALL
            .iter()
            .map(|tier| {
                (
                    tier.as_str().to_string(),
                    all.iter().filter(|p| p.tier == *tier).count(),
                )
            })
            .collect();
        let average_cost_per_1k = if all.is_empty() {
            0.0
        } else {
            all.iter().map(|p| p.cost_per_1k_tokens).sum::<f64>() / all.len() as f64
        };

        RegistryStats {
            total: all.len(),
            by_tier,
            with_api_keys: all.iter().filter(|p| p.has_api_key()).count(),
            average_cost_per_1k,
        }
    }
}

fn validate_record(provider: &ProviderRecord) -> Vec<ConfigIssue> {
    let mut issues = Vec::new();

    if provider.base_url.trim().is_empty() {
        issues.push(ConfigIssue::MissingBaseUrl);
    } else if !(provider.base_url.starts_with("http://")
        || provider.base_url.starts_with("https://"))
    {
        issues.push(ConfigIssue::InvalidBaseUrl);
    }

    if provider.models.is_empty() {
        issues.push(ConfigIssue::NoModels);
    }

    if provider.tier == Tier::Official && !provider.has_api_key() {
        issues.push(ConfigIssue::OfficialWithoutKey);
    }

    if provider.timeout <= 0 {
        issues.push(ConfigIssue::InvalidTimeout);
    }

    if provider.max_requests_per_minute <= 0 {
        issues.push(ConfigIssue::InvalidRateLimit);
    }

    if !provider.cost_per_1k_tokens.is_finite() || provider.cost_per_1k_tokens < 0.0 {
        issues.push(ConfigIssue::InvalidCost);
    }

    issues
}
