//! OpenAI-compatible request and response types, plus liaison extensions.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::registry::Tier;
use crate::router::{ComplexityLevel, ComplexityScore, ScoreBreakdown, ScoredProvider};

/// Model hint meaning "let the router choose".
pub const AUTO_MODEL: &str = "auto";

/// Chat completion request (OpenAI-compatible).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatCompletionRequest {
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// Selection hints: `priority`, `complexity_hint`, `domain`.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub context: Map<String, Value>,
    /// Hard filters: `max_cost_per_1k`, `max_timeout`, `allowed_tiers`,
    /// `required_model`, `budget_weight`.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub constraints: Map<String, Value>,
}

/// A chat message.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Message {
    pub role: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ChatCompletionRequest {
    /// Every message's content joined with spaces; this is what gets analyzed.
    pub fn content(&self) -> String {
        self.messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// The caller's model hint, unless it is absent, blank or `auto`.
    pub fn model_hint(&self) -> Option<&str> {
        self.model
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty() && !m.eq_ignore_ascii_case(AUTO_MODEL))
    }
}

/// Chat completion response (OpenAI-compatible).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatCompletionResponse {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<Choice>,
    pub usage: Usage,
    /// liaison extension: which provider handled this request
    pub x_provider: String,
    /// liaison extension: complexity classification of the request
    pub x_complexity: ComplexityLevel,
    /// liaison extension: estimated cost in USD
    pub x_cost: f64,
}

/// A completion choice.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Choice {
    pub index: u32,
    pub message: Message,
    pub finish_reason: Option<String>,
}

/// Token usage statistics.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

/// Body of `POST /v1/analyze`.
#[derive(Debug, Clone, Deserialize)]
pub struct AnalyzeRequest {
    pub content: String,
    #[serde(default)]
    pub context: Map<String, Value>,
    #[serde(default)]
    pub constraints: Map<String, Value>,
}

/// Complexity breakdown of one request.
#[derive(Debug, Clone, Serialize)]
pub struct ComplexityReport {
    pub reasoning: f64,
    pub knowledge: f64,
    pub computation: f64,
    pub coordination: f64,
    pub total_score: f64,
    pub complexity_level: ComplexityLevel,
}

impl From<ComplexityScore> for ComplexityReport {
    fn from(score: ComplexityScore) -> Self {
        Self {
            reasoning: score.reasoning,
            knowledge: score.knowledge,
            computation: score.computation,
            coordination: score.coordination,
            total_score: score.total_score(),
            complexity_level: score.complexity_level(),
        }
    }
}

/// One entry of a provider ranking.
#[derive(Debug, Clone, Serialize)]
pub struct RankedProvider {
    pub name: String,
    pub tier: Tier,
    pub scores: ScoreBreakdown,
}

impl From<&ScoredProvider> for RankedProvider {
    fn from(scored: &ScoredProvider) -> Self {
        Self {
            name: scored.provider.name.clone(),
            tier: scored.provider.tier,
            scores: scored.scores,
        }
    }
}

/// Response of `POST /v1/analyze`.
#[derive(Debug, Clone, Serialize)]
pub struct AnalyzeResponse {
    pub complexity: ComplexityReport,
    /// Name of the provider that would be selected, if any.
    pub selected: Option<String>,
    pub ranking: Vec<RankedProvider>,
}

/// Body of `PUT /providers/{name}/health`.
#[derive(Debug, Clone, Deserialize)]
pub struct HealthUpdate {
    pub health_score: f64,
}
