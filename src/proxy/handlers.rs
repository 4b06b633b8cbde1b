//! HTTP request handlers.

use std::collections::BTreeMap;

use axum::{
    extract::{Extension, Path, State},
    response::IntoResponse,
    Json,
};

use super::server::{AppState, RequestId};
use super::types::{
    AnalyzeRequest, AnalyzeResponse, ChatCompletionRequest, ChatCompletionResponse, Choice,
    ComplexityReport, HealthUpdate, Message, RankedProvider, Usage,
};
use crate::error::Error;
use crate::metrics::{ProviderMetrics, RequestMetric, UNROUTED_PROVIDER};
use crate::registry::ProviderRecord;
use crate::router::{ComplexityScore, Constraints, RequestContext};

/// `error_kind` recorded when selection comes back empty.
const NO_PROVIDER_ERROR_KIND: &str = "no_provider_available";

/// Constraints for a request, with a concrete model hint standing in for
/// `required_model` when the caller did not set one.
fn request_constraints(
    constraints: &serde_json::Map<String, serde_json::Value>,
    model_hint: Option<&str>,
) -> Constraints {
    let mut parsed = Constraints::from_map(constraints);
    if parsed.required_model.is_none() {
        parsed.required_model = model_hint.map(str::to_string);
    }
    parsed
}

/// The model a request is served with: the caller's hint, else the
/// provider's first listed model.
fn serving_model(provider: &ProviderRecord, model_hint: Option<&str>) -> String {
    model_hint
        .map(str::to_string)
        .or_else(|| provider.models.first().cloned())
        .unwrap_or_else(|| "unknown".to_string())
}

fn simulated_completion(provider: &ProviderRecord, score: &ComplexityScore) -> String {
    format!(
        "This is a simulated response from {} for complexity level {}",
        provider.name,
        score.complexity_level()
    )
}

/// Handle POST /v1/chat/completions
///
/// Dispatch is simulated: the selected provider is never contacted, but the
/// outcome is costed and fed back into the tracker and metrics as if it had been.
pub async fn chat_completions(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Json(request): Json<ChatCompletionRequest>,
) -> Result<Json<ChatCompletionResponse>, Error> {
    let start = std::time::Instant::now();

    if request.messages.is_empty() {
        return Err(Error::BadRequest("messages must not be empty".to_string()));
    }

    let content = request.content();
    let model_hint = request.model_hint();
    let context = RequestContext::from_map(&request.context);
    let constraints = request_constraints(&request.constraints, model_hint);

    let score = state.analyzer.analyze(&content, &context);
    tracing::info!(
        request_id = %request_id.0,
        complexity = %score.complexity_level(),
        total = score.total_score(),
        "Received chat completion request"
    );

    let Some(selected) = state.selector.select_scored(&score, &context, &constraints) else {
        // Counted as a failed request with nobody to attribute it to.
        state.metrics.record_request(
            RequestMetric::new(
                UNROUTED_PROVIDER,
                model_hint.unwrap_or("unknown"),
                false,
                start.elapsed().as_secs_f64(),
                0.0,
                score.complexity_level(),
            )
            .with_error(NO_PROVIDER_ERROR_KIND),
        );
        return Err(Error::NoProviderAvailable);
    };
    let provider = selected.provider;

    let model = serving_model(&provider, model_hint);
    let completion = simulated_completion(&provider, &score);
    let cost = state
        .estimator
        .estimate(&provider, &model, &content, &completion);

    let response_time = start.elapsed().as_secs_f64();
    state
        .tracker
        .update(&provider.name, response_time, true, cost.efficiency());
    state.metrics.record_request(
        RequestMetric::new(
            provider.name.clone(),
            model.clone(),
            true,
            response_time,
            cost.total_cost,
            score.complexity_level(),
        )
        .with_tokens(cost.input_tokens, cost.output_tokens),
    );

    Ok(Json(ChatCompletionResponse {
        id: format!("chatcmpl-{}", request_id.0),
        object: "chat.completion".to_string(),
        created: chrono::Utc::now().timestamp(),
        model,
        choices: vec![Choice {
            index: 0,
            message: Message {
                role: "assistant".to_string(),
                content: completion,
                name: None,
            },
            finish_reason: Some("stop".to_string()),
        }],
        usage: Usage {
            prompt_tokens: cost.input_tokens,
            completion_tokens: cost.output_tokens,
            total_tokens: cost.total_tokens(),
        },
        x_provider: provider.name,
        x_complexity: score.complexity_level(),
        x_cost: cost.total_cost,
    }))
}

/// Handle POST /v1/analyze - complexity and ranking without dispatch
pub async fn analyze(
    State(state): State<AppState>,
    Json(request): Json<AnalyzeRequest>,
) -> impl IntoResponse {
    let context = RequestContext::from_map(&request.context);
    let constraints = Constraints::from_map(&request.constraints);

    let score = state.analyzer.analyze(&request.content, &context);
    let ranking: Vec<RankedProvider> = state
        .selector
        .rank(&score, &context, &constraints)
        .iter()
        .map(RankedProvider::from)
        .collect();

    Json(AnalyzeResponse {
        complexity: ComplexityReport::from(score),
        selected: ranking.first().map(|r| r.name.clone()),
        ranking,
    })
}

/// Handle GET /health
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "liaison",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime": state.metrics.system_metrics().uptime,
        "providers": state.registry.stats(),
    }))
}

/// Handle GET /providers - configured providers with live health and stats
pub async fn list_providers(State(state): State<AppState>) -> impl IntoResponse {
    let providers: Vec<serde_json::Value> = state
        .registry
        .list()
        .iter()
        .map(|p| {
            serde_json::json!({
                "name": p.name,
                "tier": p.tier,
                "base_url": p.base_url,
                "models": p.models,
                "cost_per_1k_tokens": p.cost_per_1k_tokens,
                "priority": p.priority,
                "health_score": p.health_score,
                "has_api_key": p.has_api_key(),
                "performance": state.tracker.get(&p.name),
                "metrics": state.metrics.provider_metrics(&p.name),
            })
        })
        .collect();

    Json(serde_json::json!({
        "providers": providers
    }))
}

/// Handle PUT /providers/{name}/health
pub async fn update_health(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(update): Json<HealthUpdate>,
) -> Result<Json<serde_json::Value>, Error> {
    let health_score = state
        .registry
        .update_health(&name, update.health_score)
        .ok_or_else(|| Error::ProviderNotFound(name.clone()))?;

    Ok(Json(serde_json::json!({
        "name": name,
        "health_score": health_score,
    })))
}

/// Handle GET /analytics/system
pub async fn system_analytics(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.metrics.system_metrics())
}

/// Handle GET /analytics/providers - every configured provider, plus any
/// other recorded name such as unrouted requests
pub async fn provider_analytics(State(state): State<AppState>) -> impl IntoResponse {
    let mut analytics: BTreeMap<String, ProviderMetrics> = state
        .registry
        .list()
        .into_iter()
        .map(|p| {
            let empty = ProviderMetrics::empty(&p.name);
            (p.name, empty)
        })
        .collect();
    for metrics in state.metrics.all_provider_metrics() {
        analytics.insert(metrics.name.clone(), metrics);
    }

    Json(analytics)
}

/// Handle GET /analytics/costs
pub async fn cost_analytics(State(state): State<AppState>) -> impl IntoResponse {
    let system = state.metrics.system_metrics();
    let hourly: Vec<serde_json::Value> = state
        .metrics
        .hourly_snapshot()
        .into_iter()
        .map(|(hour, bucket)| {
            serde_json::json!({
                "hour": hour.to_rfc3339(),
                "requests": bucket.requests,
                "total_cost": bucket.total_cost,
            })
        })
        .collect();

    Json(serde_json::json!({
        "total_cost": system.total_cost,
        "cost_savings": system.cost_savings,
        "cost_savings_percentage": system.cost_savings_percentage,
        "requests_last_hour": system.requests_last_hour,
        "complexity_distribution": system.complexity_distribution,
        "hourly": hourly,
    }))
}
