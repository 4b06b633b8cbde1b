//! HTTP server setup and configuration.

use axum::{
    body::Body,
    extract::Request,
    http::{HeaderName, HeaderValue},
    middleware::{self, Next},
    response::Response,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use super::handlers;
use crate::config::Config;
use crate::error::Error;
use crate::metrics::{MetricsAggregator, RetentionSweep};
use crate::registry::ProviderRegistry;
use crate::router::{
    ComplexityAnalyzer, CostEstimator, PerformanceTracker, RateTableEstimator, Selector,
};

/// Response header: correlation ID (UUID v4).
pub const LIAISON_REQUEST_ID_HEADER: &str = "x-liaison-request-id";

/// Per-route cap on requests in flight; callers beyond it wait for a slot.
const MAX_IN_FLIGHT_REQUESTS: usize = 1024;

/// Correlation ID attached to every request as an extension.
#[derive(Debug, Clone, Copy)]
pub struct RequestId(pub Uuid);

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub analyzer: ComplexityAnalyzer,
    pub selector: Selector,
    pub registry: Arc<ProviderRegistry>,
    pub tracker: Arc<PerformanceTracker>,
    pub metrics: Arc<MetricsAggregator>,
    pub estimator: Arc<dyn CostEstimator>,
}

impl AppState {
    /// Wire up the routing core for `config`, using the rate-table cost estimator.
    pub fn from_config(config: &Config) -> Self {
        let registry = Arc::new(ProviderRegistry::new(config.providers.clone()));
        let tracker = Arc::new(PerformanceTracker::new());
        let metrics = Arc::new(MetricsAggregator::new(
            config.metrics.retention_hours,
            config.metrics.premium_cost_per_request,
        ));
        Self::new(registry, tracker, metrics, Arc::new(RateTableEstimator))
    }

    pub fn new(
        registry: Arc<ProviderRegistry>,
        tracker: Arc<PerformanceTracker>,
        metrics: Arc<MetricsAggregator>,
        estimator: Arc<dyn CostEstimator>,
    ) -> Self {
        Self {
            analyzer: ComplexityAnalyzer::new(),
            selector: Selector::new(registry.clone(), tracker.clone()),
            registry,
            tracker,
            metrics,
            estimator,
        }
    }
}

async fn request_id_middleware(mut req: Request<Body>, next: Next) -> Response {
    let request_id = RequestId(Uuid::new_v4());
    req.extensions_mut().insert(request_id);

    let mut response = next.run(req).await;

    if let Ok(value) = HeaderValue::from_str(&request_id.0.to_string()) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(LIAISON_REQUEST_ID_HEADER), value);
    }

    response
}

/// Create the axum router with all endpoints.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // OpenAI-compatible endpoints
        .route("/v1/chat/completions", post(handlers::chat_completions))
        // liaison extensions
        .route("/v1/analyze", post(handlers::analyze))
        .route("/health", get(handlers::health))
        .route("/providers", get(handlers::list_providers))
        .route("/providers/:name/health", put(handlers::update_health))
        .route("/analytics/system", get(handlers::system_analytics))
        .route("/analytics/providers", get(handlers::provider_analytics))
        .route("/analytics/costs", get(handlers::cost_analytics))
        // State and middleware
        .with_state(state)
        .layer(middleware::from_fn(request_id_middleware))
        .layer(ConcurrencyLimitLayer::new(MAX_IN_FLIGHT_REQUESTS))
        .layer(TraceLayer::new_for_http())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

/// Run the HTTP server until Ctrl-C.
///
/// Refuses to start without providers. The metrics retention sweep runs for
/// the lifetime of the server and is stopped after the listener drains.
pub async fn run_server(config: Config) -> anyhow::Result<()> {
    if config.providers.is_empty() {
        return Err(Error::NoProvidersConfigured.into());
    }

    let listen_addr = config.server.listen.clone();
    let state = AppState::from_config(&config);

    for (name, issues) in state.registry.validate() {
        for issue in issues {
            tracing::warn!(provider = %name, issue = %issue, "Provider configuration problem");
        }
    }

    let sweep = RetentionSweep::spawn(
        state.metrics.clone(),
        Duration::from_secs(config.metrics.sweep_interval_secs.max(1)),
    );

    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    tracing::info!(
        address = %listen_addr,
        providers = config.providers.len(),
        "Starting liaison server"
    );

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    sweep.shutdown().await;
    served?;

    Ok(())
}
