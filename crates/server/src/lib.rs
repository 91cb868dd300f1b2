//! GHGP Server: the HTTP layer of the analytics API.
//!
//! Exposes the [`AnalyticsService`] via:
//! - **REST (mount prefix, default `/ghgp`)**: the JSON and CSV endpoints,
//!   dispatched by [`router::Router`].
//! - **Observability**: `/health`, `/ready` and Prometheus `/metrics`.
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Json;
use ghgp_common::config::AppConfig;
use ghgp_runtime::AnalyticsService;
use serde_json::json;
use tracing::{error, info};

pub mod metrics;
pub mod router;

pub use metrics::Metrics;

#[derive(Clone)]
pub struct AppState {
    router: Arc<router::Router>,
    metrics: Arc<Metrics>,
}

/// Full application: health and metrics routes, everything else through the dispatcher.
pub fn build_app(
    service: Arc<AnalyticsService>,
    metrics: Arc<Metrics>,
    mount_prefix: &str,
) -> axum::Router {
    let state = AppState {
        router: Arc::new(router::Router::new(service, metrics.clone(), mount_prefix)),
        metrics,
    };

    axum::Router::new()
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .route("/metrics", get(metrics_handler))
        .fallback(dispatch_handler)
        .with_state(state)
}

pub struct GhgpServer {
    config: AppConfig,
}

impl GhgpServer {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let service = Arc::new(
            AnalyticsService::from_config(&self.config)
                .context("Failed to build analytics service")?,
        );
        let metrics = Arc::new(Metrics::new().context("Failed to register metrics")?);
        let app = build_app(service, metrics, &self.config.server.mount_prefix);

        let addr: SocketAddr = self
            .config
            .server
            .listen_addr
            .parse()
            .with_context(|| format!("Invalid listen address: {}", self.config.server.listen_addr))?;
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind to {}", addr))?;

        info!(
            "GHGP API listening on {} (mount prefix {}, bucket {})",
            addr, self.config.server.mount_prefix, self.config.storage.bucket
        );

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("HTTP server error")?;

        info!("GHGP API stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
}

async fn dispatch_handler(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    body: Bytes,
) -> Response {
    state.router.dispatch(&method, &uri, &body).await
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn ready_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let counts = state.router.service().cache().counts();
    Json(json!({
        "status": "ready",
        "snapshots": {
            "hits": counts.hits,
            "misses": counts.misses,
            "fetches": counts.fetches,
            "failures": counts.failures,
        }
    }))
}

async fn metrics_handler(State(state): State<AppState>) -> Response {
    state
        .metrics
        .observe_snapshots(state.router.service().cache().counts());

    match state.metrics.render() {
        Ok((content_type, buffer)) => {
            ([(header::CONTENT_TYPE, content_type)], buffer).into_response()
        }
        Err(e) => {
            error!(target: "errors", "Failed to encode metrics: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
