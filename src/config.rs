//! Configuration parsing for liaison.
//!
//! Providers come from a TOML file as an array of `[[providers]]` rows whose
//! columns mirror the provider table: name, tier, base URL, API key, models,
//! timeout, rate limit, cost, priority and notes. Each row is converted on its
//! own so one malformed row never aborts the whole load.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::path::Path;

use crate::registry::{ProviderRecord, Tier};

/// Root configuration structure.
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub metrics: MetricsConfig,
    pub logging: LoggingConfig,
    pub providers: Vec<ProviderRecord>,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address to listen on (e.g., "127.0.0.1:8000")
    #[serde(default = "default_listen")]
    pub listen: String,
}

fn default_listen() -> String {
    "127.0.0.1:8000".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

/// Metrics retention configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// How long request metrics and hourly buckets are kept
    #[serde(default = "default_retention_hours")]
    pub retention_hours: u32,
    /// How often the retention sweep runs
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    /// Assumed cost of one request on a premium provider, for savings estimates
    #[serde(default = "default_premium_cost")]
    pub premium_cost_per_request: f64,
}

fn default_retention_hours() -> u32 {
    24
}

fn default_sweep_interval_secs() -> u64 {
    3600
}

fn default_premium_cost() -> f64 {
    0.002
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            retention_hours: default_retention_hours(),
            sweep_interval_secs: default_sweep_interval_secs(),
            premium_cost_per_request: default_premium_cost(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// API key wrapper that redacts in Debug/Display/Serialize and zeroizes on drop.
#[derive(Clone)]
pub struct ApiKey(SecretString);

impl ApiKey {
    /// Access the raw key value. Every call site is auditable via `grep expose_secret`.
    pub fn expose_secret(&self) -> &str {
        self.0.expose_secret()
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl std::fmt::Display for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl Serialize for ApiKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str("[REDACTED]")
    }
}

impl<'de> serde::Deserialize<'de> for ApiKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(|s| ApiKey(SecretString::from(s)))
    }
}

impl From<String> for ApiKey {
    fn from(s: String) -> Self {
        ApiKey(SecretString::from(s))
    }
}

impl From<&str> for ApiKey {
    fn from(s: &str) -> Self {
        ApiKey(SecretString::from(s))
    }
}

/// How a provider's API key was resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum KeySource {
    /// Key was a literal string in config (no ${} references)
    Literal,
    /// Key contained ${VAR} references expanded from environment
    EnvExpanded,
    /// Key was auto-discovered from convention env var (holds var name)
    Convention(String),
    /// Key referenced an environment variable that is not set (holds var name)
    Unresolved(String),
    /// No key available
    None,
}

impl std::fmt::Display for KeySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeySource::Literal => write!(f, "config-literal"),
            KeySource::EnvExpanded => write!(f, "env-expanded"),
            KeySource::Convention(var) => write!(f, "convention ({})", var),
            KeySource::Unresolved(var) => write!(f, "unresolved ({})", var),
            KeySource::None => write!(f, "none"),
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Environment variable '{var}' not set for provider '{provider}': {message}")]
    EnvVar {
        var: String,
        provider: String,
        message: String,
    },
}

/// Model column: either a pipe-delimited string or a TOML list.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RawModels {
    Delimited(String),
    List(Vec<String>),
}

impl RawModels {
    fn into_models(self) -> Vec<String> {
        let models: Vec<String> = match self {
            RawModels::Delimited(s) => s.split('|').map(str::to_string).collect(),
            RawModels::List(list) => list,
        };
        models
            .into_iter()
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
            .collect()
    }
}

/// One provider row as written in the config file.
/// `api_key` may still contain `${VAR}` references.
#[derive(Debug, Deserialize)]
pub struct RawProviderRow {
    #[serde(default)]
    name: String,
    #[serde(default)]
    tier: String,
    #[serde(default)]
    base_url: String,
    api_key: Option<String>,
    models: Option<RawModels>,
    #[serde(default = "default_timeout")]
    timeout: i64,
    #[serde(default = "default_max_requests")]
    max_requests_per_minute: i64,
    #[serde(default = "default_cost_per_1k")]
    cost_per_1k_tokens: f64,
    #[serde(default = "default_priority")]
    priority: i32,
    #[serde(default)]
    other: String,
}

fn default_timeout() -> i64 {
    30
}

fn default_max_requests() -> i64 {
    60
}

fn default_cost_per_1k() -> f64 {
    0.002
}

fn default_priority() -> i32 {
    1
}

/// Raw configuration deserialized directly from TOML.
///
/// Provider rows stay untyped until [`Config::from_raw_with`] so that a row with a
/// bad column type is skipped instead of failing the whole file.
#[derive(Debug, Deserialize)]
pub struct RawConfig {
    #[serde(default)]
    server: ServerConfig,
    #[serde(default)]
    metrics: MetricsConfig,
    #[serde(default)]
    logging: LoggingConfig,
    #[serde(default)]
    providers: Vec<toml::Value>,
}

impl RawConfig {
    /// Read and parse a config file without resolving any provider rows.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io {
            path: path.as_ref().display().to_string(),
            source: e,
        })?;
        Ok(toml::from_str(&content)?)
    }

    /// Configured log level, available before logging is initialised.
    pub fn log_level(&self) -> &str {
        &self.logging.level
    }
}

/// Expand all `${VAR}` references in a string using a custom lookup function.
///
/// Supports multiple `${VAR}` in one string (e.g., `${SCHEME}://${HOST}/v1`).
/// Fails on first missing variable, unclosed `${`, or empty variable name.
fn expand_env_vars_with<F>(
    input: &str,
    provider_name: &str,
    lookup: F,
) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if !input.contains("${") {
        return Ok(input.to_string());
    }

    let mut result = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        result.push_str(&rest[..start]);
        let after = &rest[start + 2..];

        let end = after.find('}').ok_or_else(|| ConfigError::EnvVar {
            var: "<unclosed>".to_string(),
            provider: provider_name.to_string(),
            message: format!("Unclosed '${{' in config value: {}", input),
        })?;

        let var_name = &after[..end];
        if var_name.is_empty() {
            return Err(ConfigError::EnvVar {
                var: "".to_string(),
                provider: provider_name.to_string(),
                message: "Empty variable name in '${}' reference".to_string(),
            });
        }

        let value = lookup(var_name).ok_or_else(|| ConfigError::EnvVar {
            var: var_name.to_string(),
            provider: provider_name.to_string(),
            message: format!(
                "Environment variable '{}' is not set (referenced in provider '{}')",
                var_name, provider_name
            ),
        })?;

        result.push_str(&value);
        rest = &after[end + 1..];
    }

    result.push_str(rest);
    Ok(result)
}

/// Derive the convention-based env var name for a provider.
///
/// - "openai" -> "LIAISON_OPENAI_API_KEY"
/// - "together-ai" -> "LIAISON_TOGETHER_AI_API_KEY"
pub fn convention_env_var_name(provider_name: &str) -> String {
    let upper_snake = provider_name.to_uppercase().replace(['-', ' '], "_");
    format!("LIAISON_{}_API_KEY", upper_snake)
}

/// Values of the key column that mean "this provider has no key".
fn is_blank_key(raw: &str) -> bool {
    let trimmed = raw.trim();
    trimmed.is_empty()
        || trimmed.eq_ignore_ascii_case("none")
        || trimmed.eq_ignore_ascii_case("null")
}

/// Resolve a row's API key column.
fn resolve_api_key<F>(
    raw_key: Option<&str>,
    provider_name: &str,
    lookup: &F,
) -> (Option<ApiKey>, KeySource)
where
    F: Fn(&str) -> Option<String>,
{
    match raw_key {
        Some(raw) if !is_blank_key(raw) && raw.contains("${") => {
            match expand_env_vars_with(raw.trim(), provider_name, lookup) {
                Ok(expanded) if !expanded.is_empty() => {
                    (Some(ApiKey::from(expanded)), KeySource::EnvExpanded)
                }
                Ok(_) => (None, KeySource::None),
                Err(e) => {
                    tracing::warn!(provider = %provider_name, error = %e, "API key not resolved");
                    let var = match e {
                        ConfigError::EnvVar { var, .. } => var,
                        _ => String::new(),
                    };
                    (None, KeySource::Unresolved(var))
                }
            }
        }
        Some(raw) if !is_blank_key(raw) => (Some(ApiKey::from(raw.trim())), KeySource::Literal),
        Some(_) => (None, KeySource::None),
        None => {
            let var_name = convention_env_var_name(provider_name);
            match lookup(&var_name) {
                Some(value) if !value.is_empty() => {
                    (Some(ApiKey::from(value)), KeySource::Convention(var_name))
                }
                _ => (None, KeySource::None),
            }
        }
    }
}

/// Convert one typed row into a provider record.
///
/// Returns `None` (after logging) for rows missing a required column.
fn record_from_row<F>(row: RawProviderRow, lookup: &F) -> Option<(ProviderRecord, KeySource)>
where
    F: Fn(&str) -> Option<String>,
{
    let name = row.name.trim().to_string();
    let tier_str = row.tier.trim().to_string();
    let base_url = row.base_url.trim().to_string();
    let models = row.models.map(RawModels::into_models).unwrap_or_default();

    if name.is_empty() || tier_str.is_empty() || base_url.is_empty() || models.is_empty() {
        tracing::warn!(
            provider = %name,
            "Skipping incomplete provider row (name, tier, base_url and models are required)"
        );
        return None;
    }

    if !row.cost_per_1k_tokens.is_finite() {
        tracing::warn!(
            provider = %name,
            cost = row.cost_per_1k_tokens,
            "Skipping provider row with non-finite cost_per_1k_tokens"
        );
        return None;
    }

    let tier = Tier::parse(&tier_str).unwrap_or_else(|| {
        tracing::warn!(
            provider = %name,
            tier = %tier_str,
            "Invalid tier, defaulting to unofficial"
        );
        Tier::Unofficial
    });

    let (api_key, source) = resolve_api_key(row.api_key.as_deref(), &name, lookup);

    let record = ProviderRecord {
        name,
        tier,
        base_url,
        api_key,
        models,
        timeout: row.timeout,
        max_requests_per_minute: row.max_requests_per_minute,
        cost_per_1k_tokens: row.cost_per_1k_tokens,
        priority: row.priority,
        health_score: 1.0,
        other: row.other.trim().to_string(),
    };

    Some((record, source))
}

impl Config {
    /// Convert raw (deserialized) config to final config, resolving API keys
    /// through `lookup`.
    ///
    /// For each provider:
    /// - `""`, `none` or `null`: no key, source = `None`
    /// - contains `${VAR}`: expand, source = `EnvExpanded` (or `Unresolved` with a warning)
    /// - any other literal: source = `Literal`
    /// - column absent: try `LIAISON_<NAME>_API_KEY`, source = `Convention(var)` or `None`
    pub fn from_raw_with<F>(raw: RawConfig, lookup: F) -> (Self, Vec<(String, KeySource)>)
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut providers = Vec::with_capacity(raw.providers.len());
        let mut key_sources = Vec::with_capacity(raw.providers.len());

        for (index, value) in raw.providers.into_iter().enumerate() {
            let row: RawProviderRow = match value.try_into() {
                Ok(row) => row,
                Err(e) => {
                    tracing::warn!(row = index, error = %e, "Skipping malformed provider row");
                    continue;
                }
            };

            if let Some((record, source)) = record_from_row(row, &lookup) {
                key_sources.push((record.name.clone(), source));
                providers.push(record);
            }
        }

        let config = Config {
            server: raw.server,
            metrics: raw.metrics,
            logging: raw.logging,
            providers,
        };

        (config, key_sources)
    }

    /// Resolve a raw config against the process environment.
    pub fn from_raw(raw: RawConfig) -> (Self, Vec<(String, KeySource)>) {
        let (config, key_sources) = Self::from_raw_with(raw, |name| std::env::var(name).ok());
        config.warn_if_empty();
        (config, key_sources)
    }

    /// Load configuration from a TOML file with environment variable expansion.
    pub fn from_file(
        path: impl AsRef<Path>,
    ) -> Result<(Self, Vec<(String, KeySource)>), ConfigError> {
        let raw = RawConfig::from_file(path.as_ref())?;
        let (config, key_sources) = Self::from_raw(raw);
        tracing::info!(
            path = %path.as_ref().display(),
            providers = config.providers.len(),
            "Loaded provider configuration"
        );
        Ok((config, key_sources))
    }

    fn warn_if_empty(&self) {
        if self.providers.is_empty() {
            tracing::warn!("No providers configured - every selection will come back empty");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn parse_with<F>(toml: &str, lookup: F) -> (Config, Vec<(String, KeySource)>)
    where
        F: Fn(&str) -> Option<String>,
    {
        let raw: RawConfig = toml::from_str(toml).unwrap();
        Config::from_raw_with(raw, lookup)
    }

    #[test]
    fn test_parse_minimal_config() {
        let (config, _) = parse_with("", no_env);
        assert_eq!(config.server.listen, "127.0.0.1:8000");
        assert_eq!(config.metrics.retention_hours, 24);
        assert_eq!(config.metrics.sweep_interval_secs, 3600);
        assert!(config.providers.is_empty());
    }

    #[test]
    fn test_parse_full_row() {
        let toml = r#"
            [server]
            listen = "0.0.0.0:9000"

            [metrics]
            retention_hours = 6

            [[providers]]
            name = "OpenAI"
            tier = "Official"
            base_url = "https://api.openai.com/v1"
            api_key = "sk-literal"
            models = "gpt-4 | gpt-4-turbo|gpt-3.5-turbo"
            timeout = 45
            max_requests_per_minute = 3500
            cost_per_1k_tokens = 0.03
            priority = 2
            other = "primary"
        "#;

        let (config, sources) = parse_with(toml, no_env);
        assert_eq!(config.server.listen, "0.0.0.0:9000");
        assert_eq!(config.metrics.retention_hours, 6);

        let p = &config.providers[0];
        assert_eq!(p.name, "OpenAI");
        assert_eq!(p.tier, Tier::Official);
        assert_eq!(p.models, vec!["gpt-4", "gpt-4-turbo", "gpt-3.5-turbo"]);
        assert_eq!(p.timeout, 45);
        assert_eq!(p.max_requests_per_minute, 3500);
        assert_eq!(p.cost_per_1k_tokens, 0.03);
        assert_eq!(p.priority, 2);
        assert_eq!(p.health_score, 1.0);
        assert_eq!(p.other, "primary");
        assert_eq!(p.api_key.as_ref().unwrap().expose_secret(), "sk-literal");
        assert_eq!(sources[0], ("OpenAI".to_string(), KeySource::Literal));
    }

    #[test]
    fn test_row_defaults_and_model_list() {
        let toml = r#"
            [[providers]]
            name = "local"
            tier = "unofficial"
            base_url = "http://localhost:11434"
            api_key = "none"
            models = ["llama2", "codellama"]
        "#;

        let (config, sources) = parse_with(toml, no_env);
        let p = &config.providers[0];
        assert_eq!(p.models, vec!["llama2", "codellama"]);
        assert_eq!(p.timeout, 30);
        assert_eq!(p.max_requests_per_minute, 60);
        assert_eq!(p.cost_per_1k_tokens, 0.002);
        assert_eq!(p.priority, 1);
        assert!(p.api_key.is_none());
        assert_eq!(sources[0].1, KeySource::None);
    }

    #[test]
    fn test_invalid_tier_defaults_to_unofficial() {
        let toml = r#"
            [[providers]]
            name = "mystery"
            tier = "platinum"
            base_url = "https://mystery.test"
            models = "m1"
        "#;

        let (config, _) = parse_with(toml, no_env);
        assert_eq!(config.providers[0].tier, Tier::Unofficial);
    }

    #[test]
    fn test_incomplete_and_malformed_rows_are_skipped() {
        let toml = r#"
            [[providers]]
            name = "no-models"
            tier = "official"
            base_url = "https://a.test"

            [[providers]]
            name = "bad-timeout"
            tier = "official"
            base_url = "https://b.test"
            models = "m"
            timeout = "soon"

            [[providers]]
            name = "good"
            tier = "community"
            base_url = "https://c.test"
            models = "m"
        "#;

        let (config, sources) = parse_with(toml, no_env);
        assert_eq!(config.providers.len(), 1);
        assert_eq!(config.providers[0].name, "good");
        assert_eq!(sources.len(), 1);
    }

    #[test]
    fn test_non_finite_cost_row_is_skipped() {
        let toml = r#"
            [[providers]]
            name = "nan-cost"
            tier = "unofficial"
            base_url = "http://localhost:1"
            models = "m"
            cost_per_1k_tokens = nan

            [[providers]]
            name = "inf-cost"
            tier = "unofficial"
            base_url = "http://localhost:2"
            models = "m"
            cost_per_1k_tokens = inf

            [[providers]]
            name = "free"
            tier = "unofficial"
            base_url = "http://localhost:3"
            models = "m"
            cost_per_1k_tokens = 0.0
        "#;

        let (config, _) = parse_with(toml, no_env);
        let names: Vec<&str> = config.providers.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["free"]);
    }

    #[test]
    fn test_env_key_expanded() {
        let toml = r#"
            [[providers]]
            name = "anthropic"
            tier = "official"
            base_url = "https://api.anthropic.com"
            api_key = "${ANTHROPIC_API_KEY}"
            models = "claude-3-5-sonnet"
        "#;

        let lookup = |name: &str| match name {
            "ANTHROPIC_API_KEY" => Some("sk-ant-123".to_string()),
            _ => None,
        };
        let (config, sources) = parse_with(toml, lookup);
        assert_eq!(
            config.providers[0].api_key.as_ref().unwrap().expose_secret(),
            "sk-ant-123"
        );
        assert_eq!(sources[0].1, KeySource::EnvExpanded);
    }

    #[test]
    fn test_unresolved_env_key_leaves_provider_keyless() {
        let toml = r#"
            [[providers]]
            name = "anthropic"
            tier = "official"
            base_url = "https://api.anthropic.com"
            api_key = "${MISSING_KEY_VAR}"
            models = "claude-3-5-sonnet"
        "#;

        let (config, sources) = parse_with(toml, no_env);
        assert_eq!(config.providers.len(), 1);
        assert!(config.providers[0].api_key.is_none());
        assert_eq!(
            sources[0].1,
            KeySource::Unresolved("MISSING_KEY_VAR".to_string())
        );
    }

    #[test]
    fn test_convention_key_lookup() {
        let toml = r#"
            [[providers]]
            name = "together-ai"
            tier = "community"
            base_url = "https://api.together.xyz"
            models = "mixtral"
        "#;

        let lookup = |name: &str| match name {
            "LIAISON_TOGETHER_AI_API_KEY" => Some("tg-key".to_string()),
            _ => None,
        };
        let (config, sources) = parse_with(toml, lookup);
        assert_eq!(
            config.providers[0].api_key.as_ref().unwrap().expose_secret(),
            "tg-key"
        );
        assert_eq!(
            sources[0].1,
            KeySource::Convention("LIAISON_TOGETHER_AI_API_KEY".to_string())
        );
    }

    #[test]
    fn test_api_key_redaction() {
        let key = ApiKey::from("super-secret-key");
        assert_eq!(format!("{:?}", key), "[REDACTED]");
        assert_eq!(format!("{}", key), "[REDACTED]");
        assert_eq!(serde_json::to_string(&key).unwrap(), "\"[REDACTED]\"");
        assert_eq!(key.expose_secret(), "super-secret-key");
    }

    // ── Expansion tests (using expand_env_vars_with, no global env state) ──

    #[test]
    fn test_expand_multiple_vars() {
        let lookup = |name: &str| match name {
            "SCHEME" => Some("https".to_string()),
            "HOST" => Some("example.com".to_string()),
            _ => None,
        };
        let result = expand_env_vars_with("${SCHEME}://${HOST}/v1", "test", lookup).unwrap();
        assert_eq!(result, "https://example.com/v1");
    }

    #[test]
    fn test_expand_no_vars_passthrough() {
        let lookup = |_: &str| -> Option<String> { panic!("should not be called") };
        let result = expand_env_vars_with("literal-value", "test", lookup).unwrap();
        assert_eq!(result, "literal-value");
    }

    #[test]
    fn test_expand_missing_var_fails() {
        let result = expand_env_vars_with("${MISSING}", "provider-alpha", no_env);
        let err = result.unwrap_err().to_string();
        assert!(err.contains("MISSING"), "Error should name the variable");
        assert!(err.contains("provider-alpha"), "Error should name the provider");
    }

    #[test]
    fn test_expand_unclosed_brace_fails() {
        let lookup = |_: &str| -> Option<String> { panic!("should not be called") };
        let err = expand_env_vars_with("${UNCLOSED", "test", lookup)
            .unwrap_err()
            .to_string()
            .to_lowercase();
        assert!(err.contains("unclosed"));
    }

    #[test]
    fn test_expand_empty_var_name_fails() {
        let lookup = |_: &str| -> Option<String> { panic!("should not be called") };
        let err = expand_env_vars_with("${}", "test", lookup)
            .unwrap_err()
            .to_string()
            .to_lowercase();
        assert!(err.contains("empty"));
    }

    #[test]
    fn test_convention_env_var_name() {
        assert_eq!(convention_env_var_name("openai"), "LIAISON_OPENAI_API_KEY");
        assert_eq!(
            convention_env_var_name("together-ai"),
            "LIAISON_TOGETHER_AI_API_KEY"
        );
    }
}
