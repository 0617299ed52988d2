use crate::config::Config;
use crate::pipeline::{DedupStats, SearchPipeline, SearchStatus, SourceStats};
use crate::server::messages::{ResultPublisher, SearchRequest, SearchResult};
use crate::{Error, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;
use tracing::{info, instrument, warn};

/// Shared state behind every handler
pub struct AppState {
    config: Arc<Config>,
    pipeline: Arc<SearchPipeline>,
    publisher: Arc<dyn ResultPublisher>,
    last_run: RwLock<Option<RunSummary>>,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        pipeline: Arc<SearchPipeline>,
        publisher: Arc<dyn ResultPublisher>,
    ) -> Self {
        Self {
            config,
            pipeline,
            publisher,
            last_run: RwLock::new(None),
        }
    }
}

/// Condensed record of the most recent pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub status: SearchStatus,
    pub papers_delivered: usize,
    pub search_rounds: u32,
    pub source_stats: BTreeMap<String, SourceStats>,
    pub deduplication_stats: DedupStats,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatsResponse {
    service: &'static str,
    version: &'static str,
    active_sources: Vec<String>,
    papers_per_source: u32,
    max_rounds: u32,
    refinement_enabled: bool,
    last_run: Option<RunSummary>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
    /// Per-source health from the most recent run; a source that has
    /// not been exercised yet reports healthy
    sources: BTreeMap<String, bool>,
}

/// Build the axum application
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/v1/search", post(search_handler))
        .route("/api/v1/stats", get(stats_handler))
        .route("/healthz", get(health_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Bind the configured address and serve until shutdown
#[instrument(skip_all)]
pub async fn serve(state: Arc<AppState>) -> Result<()> {
    let addr: SocketAddr = format!(
        "{}:{}",
        state.config.server.host, state.config.server.port
    )
    .parse()
    .map_err(|e| Error::Service(format!("Invalid listen address: {}", e)))?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Service(format!("Failed to bind {}: {}", addr, e)))?;

    info!("HTTP surface listening on {}", addr);

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| Error::Service(format!("HTTP server error: {}", e)))?;

    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutdown signal received");
    }
}

async fn search_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SearchRequest>,
) -> Response {
    let job = match request.validate(&state.config.search) {
        Ok(job) => job,
        Err(error) => {
            let body = serde_json::json!({ "error": error.to_string() });
            return (StatusCode::BAD_REQUEST, Json(body)).into_response();
        }
    };

    let outcome = state.pipeline.run(&job).await;

    *state.last_run.write().await = Some(RunSummary {
        status: outcome.status,
        papers_delivered: outcome.papers.len(),
        search_rounds: outcome.search_rounds,
        source_stats: outcome.source_stats.clone(),
        deduplication_stats: outcome.dedup_stats,
    });

    let result = SearchResult::from_outcome(&request, outcome);
    if let Err(error) = state.publisher.publish(&result).await {
        warn!(publisher = state.publisher.name(), %error, "result publishing failed");
    }

    (StatusCode::OK, Json(result)).into_response()
}

async fn stats_handler(State(state): State<Arc<AppState>>) -> (StatusCode, Json<StatsResponse>) {
    let stats = StatsResponse {
        service: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        active_sources: state
            .pipeline
            .registry()
            .source_names()
            .into_iter()
            .map(str::to_string)
            .collect(),
        papers_per_source: state.config.search.papers_per_source,
        max_rounds: state.config.search.max_rounds,
        refinement_enabled: state.config.search.enable_refinement,
        last_run: state.last_run.read().await.clone(),
    };
    (StatusCode::OK, Json(stats))
}

async fn health_handler(State(state): State<Arc<AppState>>) -> (StatusCode, Json<HealthResponse>) {
    let last_run = state.last_run.read().await;
    let sources: BTreeMap<String, bool> = state
        .pipeline
        .registry()
        .source_names()
        .into_iter()
        .map(|name| {
            let healthy = last_run
                .as_ref()
                .and_then(|run| run.source_stats.get(name))
                .map_or(true, SourceStats::succeeded);
            (name.to_string(), healthy)
        })
        .collect();

    let degraded = sources.is_empty();
    let health = HealthResponse {
        status: if degraded { "degraded" } else { "healthy" },
        service: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        sources,
    };

    let code = if degraded {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    (code, Json(health))
}
