//! # Contentful Bridge HTTP Service
//!
//! HTTP server receiving Contentful webhooks and forwarding them through the
//! event pipeline into BigQuery.
//!
//! This service provides:
//! - The webhook endpoint (`POST /api/contentfulEventsHandler` by default)
//! - A liveness endpoint (`GET /health`)
//! - Prometheus metrics (`GET /metrics`)

pub mod config;
pub mod errors;
pub mod metrics;

pub use config::{
    AnalyticsConfig, ArchiveBackend, ArchiveConfig, ClientsConfig, ContentfulConfig,
    IdentityConfig, LoggingConfig, SecretsBackend, SecretsConfig, ServerConfig, ServiceConfig,
    WebhookConfig,
};
pub use errors::{ConfigError, EventHandlerError, ServiceError};
pub use metrics::ServiceMetrics;

use axum::{
    extract::{DefaultBodyLimit, Query, State},
    http::{HeaderMap, StatusCode},
    response::{Json, Response},
    routing::{get, post},
    Router,
};
use bytes::Bytes;
use contentful_bridge_core::{EventPipeline, InboundRequest, Timestamp};
use errors::{text_response, PROCESSING_FAILED_BODY};
use serde::{Deserialize, Serialize};
use std::{any::Any, collections::HashMap, future::IntoFuture, sync::Arc, time::Duration};
use tower::ServiceBuilder;
use tower_http::{
    catch_panic::CatchPanicLayer, limit::RequestBodyLimitLayer, trace::TraceLayer,
};
use tracing::{error, info, instrument, warn};

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;

/// Body returned when a webhook was processed
pub const SUCCESS_BODY: &str = "Webhook received and processed successfully";

// ============================================================================
// Application State
// ============================================================================

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Configuration for the service
    pub config: ServiceConfig,

    /// Pipeline handling each webhook delivery
    pub pipeline: Arc<EventPipeline>,

    /// Metrics collector for observability
    pub metrics: Arc<ServiceMetrics>,
}

impl AppState {
    /// Create new application state
    ///
    /// The pipeline is attached to `metrics` so `/metrics` reports what it
    /// records.
    pub fn new(config: ServiceConfig, pipeline: EventPipeline, metrics: Arc<ServiceMetrics>) -> Self {
        let pipeline = pipeline.with_metrics(metrics.clone());

        Self {
            config,
            pipeline: Arc::new(pipeline),
            metrics,
        }
    }
}

/// Liveness response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: Timestamp,
    pub version: String,
}

// ============================================================================
// HTTP Server
// ============================================================================

/// Create HTTP router with all endpoints
pub fn create_router(state: AppState) -> Router {
    let max_body_size = state.config.server.max_body_size;

    let webhook_routes = Router::new().route(
        &state.config.webhook.endpoint_path,
        post(handle_contentful_event),
    );

    let health_routes = Router::new().route("/health", get(handle_health_check));

    let observability_routes = Router::new().route("/metrics", get(metrics_endpoint));

    Router::new()
        .merge(webhook_routes)
        .merge(health_routes)
        .merge(observability_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CatchPanicLayer::custom(handle_panic))
                .layer(DefaultBodyLimit::disable())
                .layer(RequestBodyLimitLayer::new(max_body_size))
                .into_inner(),
        )
        .with_state(state)
}

/// Start HTTP server and run until SIGINT or SIGTERM
pub async fn start_server(state: AppState) -> Result<(), ServiceError> {
    let host = state.config.server.host.clone();
    let port = state.config.server.port;
    let shutdown_timeout = Duration::from_secs(state.config.server.shutdown_timeout_seconds);
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind((host.as_str(), port))
        .await
        .map_err(|e| ServiceError::BindFailed {
            address: format!("{}:{}", host, port),
            message: e.to_string(),
        })?;

    info!(host = %host, port = port, "Starting HTTP server");

    let (signalled_tx, mut signalled_rx) = tokio::sync::watch::channel(false);

    // In-flight requests get `shutdown_timeout` to finish once a signal arrives
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            info!(
                timeout_seconds = shutdown_timeout.as_secs(),
                "Initiating graceful shutdown"
            );
            let _ = signalled_tx.send(true);
        })
        .into_future();

    let deadline = async move {
        while !*signalled_rx.borrow() {
            if signalled_rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
        tokio::time::sleep(shutdown_timeout).await;
    };

    tokio::select! {
        result = server => {
            result.map_err(|e| ServiceError::ServerFailed {
                message: e.to_string(),
            })?;
        }
        _ = deadline => {
            warn!("Graceful shutdown timed out; abandoning in-flight requests");
        }
    }

    info!("HTTP server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C signal handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT (Ctrl+C)"),
        _ = terminate => info!("Received SIGTERM"),
    }
}

fn handle_panic(_payload: Box<dyn Any + Send + 'static>) -> Response {
    error!("Request handler panicked");
    text_response(StatusCode::INTERNAL_SERVER_ERROR, PROCESSING_FAILED_BODY)
}

// ============================================================================
// Webhook Handler
// ============================================================================

/// Handle a Contentful webhook delivery
///
/// Runs the whole pipeline before answering: 200 once the row is inserted,
/// 400 for an incomplete payload, 500 for any downstream failure.
#[instrument(skip(state, query, headers, body), fields(size = body.len()))]
pub async fn handle_contentful_event(
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, EventHandlerError> {
    let request = InboundRequest::new(header_map(&headers), query, body);

    state.pipeline.handle(&request).await?;

    Ok(text_response(StatusCode::OK, SUCCESS_BODY))
}

/// Convert headers to a map, dropping values that are not visible ASCII
fn header_map(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect()
}

// ============================================================================
// Health and Observability Handlers
// ============================================================================

/// Liveness endpoint
async fn handle_health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: Timestamp::now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Prometheus metrics endpoint
#[instrument(skip_all)]
async fn metrics_endpoint(State(state): State<AppState>) -> Result<String, StatusCode> {
    state.metrics.encode().map_err(|e| {
        error!(error = %e, "Failed to encode metrics");
        StatusCode::INTERNAL_SERVER_ERROR
    })
}
