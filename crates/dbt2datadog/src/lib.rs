// dbt2datadog server - relays dbt Cloud job-run webhooks to Datadog logs
//
// Each authenticated "run finished" delivery fans out into one Metadata API
// query per resource kind; every returned node becomes one Datadog log record.
//
// Features:
// - Axum HTTP server (HTTP/1.1, HTTP/2)
// - HMAC-SHA256 webhook authentication
// - Structured logging with tracing
// - Graceful shutdown

use anyhow::{Context, Result};
use axum::{
    extract::DefaultBodyLimit,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use dbt2datadog_config::RuntimeConfig;
use dbt2datadog_core::{LogSink, MetadataSource, PipelineOptions, WebhookVerifier};
use serde_json::json;
use std::sync::Arc;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

mod handlers;
mod init;
pub mod intake;
pub mod metadata;

use handlers::{handle_webhook, health_check, ready_check};
pub use init::init_tracing;
pub use intake::DatadogIntake;
pub use metadata::MetadataClient;

/// Application state shared across all requests
#[derive(Clone)]
pub(crate) struct AppState {
    pub verifier: Arc<WebhookVerifier>,
    pub metadata: Arc<dyn MetadataSource>,
    pub sink: Arc<dyn LogSink>,
    pub options: Arc<PipelineOptions>,
    pub max_payload_bytes: usize,
}

/// Error type that implements IntoResponse
pub(crate) struct AppError {
    status: StatusCode,
    error: anyhow::Error,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(status = %self.status, "Request error: {:?}", self.error);
        } else {
            warn!(status = %self.status, "Request rejected: {:#}", self.error);
        }
        (
            self.status,
            Json(json!({
                "detail": self.error.to_string(),
            })),
        )
            .into_response()
    }
}

impl AppError {
    pub fn with_status(status: StatusCode, error: anyhow::Error) -> Self {
        Self { status, error }
    }

    pub fn bad_request<E>(error: E) -> Self
    where
        E: Into<anyhow::Error>,
    {
        Self {
            status: StatusCode::BAD_REQUEST,
            error: error.into(),
        }
    }

    pub fn forbidden(message: &'static str) -> Self {
        Self {
            status: StatusCode::FORBIDDEN,
            error: anyhow::anyhow!(message),
        }
    }
}

/// Router with the given outbound clients; used directly by tests.
///
/// Bodies are capped at `max_payload_bytes` in place of axum's 2 MiB default.
pub(crate) fn router(state: AppState) -> Router {
    let max_payload_bytes = state.max_payload_bytes;
    Router::new()
        .route("/", post(handle_webhook))
        .route("/health", get(health_check))
        .route("/ready", get(ready_check))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(DefaultBodyLimit::max(max_payload_bytes)),
        )
        .with_state(state)
}

/// Build the full application router from configuration.
pub fn build_router(config: &RuntimeConfig) -> Result<Router> {
    let metadata = MetadataClient::new(&config.metadata)?;
    let intake = DatadogIntake::new(&config.datadog)?;

    let state = AppState {
        verifier: Arc::new(WebhookVerifier::new(config.webhook.secret.as_bytes())),
        metadata: Arc::new(metadata),
        sink: Arc::new(intake),
        options: Arc::new(config.pipeline_options()),
        max_payload_bytes: config.request.max_payload_bytes,
    };

    Ok(router(state))
}

/// Graceful shutdown handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown...");
        },
        _ = terminate => {
            info!("Received SIGTERM, starting graceful shutdown...");
        },
    }
}

/// Entry point for server mode (loads config automatically)
pub async fn run() -> Result<()> {
    let config = RuntimeConfig::load().context("Failed to load configuration")?;
    run_with_config(config).await
}

/// Entry point for server mode with pre-loaded configuration (for CLI usage)
pub async fn run_with_config(config: RuntimeConfig) -> Result<()> {
    init_tracing(&config);

    let addr = config.server.listen_addr.clone();
    let app = build_router(&config)?;

    info!(
        "Max payload size set to {} bytes",
        config.request.max_payload_bytes
    );
    info!(
        resources = ?config.metadata.resources,
        endpoint = %config.metadata.endpoint,
        "Metadata API configured"
    );
    info!(
        intake = %config.datadog.intake_base_url(),
        max_batch_size = config.datadog.max_batch_size,
        "Datadog logs intake configured"
    );

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context(format!("Failed to bind to {}", addr))?;

    info!("Webhook endpoint listening on http://{}", addr);
    info!("Routes:");
    info!("  POST http://{}/       - dbt Cloud job-run webhook", addr);
    info!("  GET  http://{}/health - Health check", addr);
    info!("  GET  http://{}/ready  - Readiness check", addr);
    info!("Press Ctrl+C or send SIGTERM to stop");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");

    Ok(())
}
