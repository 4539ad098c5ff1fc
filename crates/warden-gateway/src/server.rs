// SPDX-FileCopyrightText: 2026 Warden Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Health HTTP server built on axum.
//!
//! Sets up routes, middleware, and shared state for the health surface.

use std::sync::Arc;
use std::time::Instant;

use axum::{Router, routing::get};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use warden_core::WardenError;
use warden_plugin::ReadinessTracker;

use crate::handlers;

/// Renders the Prometheus text exposition.
pub type MetricsRender = Arc<dyn Fn() -> String + Send + Sync>;

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct HealthState {
    /// Process start time for uptime calculation.
    pub start_time: Instant,
    pub readiness: Arc<ReadinessTracker>,
    /// `None` serves 404 on `/metrics`.
    pub prometheus_render: Option<MetricsRender>,
}

impl HealthState {
    pub fn new(readiness: Arc<ReadinessTracker>) -> Self {
        Self {
            start_time: Instant::now(),
            readiness,
            prometheus_render: None,
        }
    }

    pub fn with_metrics(mut self, render: MetricsRender) -> Self {
        self.prometheus_render = Some(render);
        self
    }
}

/// Gateway server configuration (mirrors `GatewayConfig` from warden-config).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Build the health router.
pub fn router(state: HealthState) -> Router {
    Router::new()
        .route("/health", get(handlers::get_health))
        .route("/health/readiness", get(handlers::get_readiness))
        .route("/health/domains/{domain}", get(handlers::get_domain))
        .route("/metrics", get(handlers::get_metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind the configured address.
pub async fn bind(config: &ServerConfig) -> Result<TcpListener, WardenError> {
    let addr = format!("{}:{}", config.host, config.port);
    TcpListener::bind(&addr)
        .await
        .map_err(|e| WardenError::Gateway {
            message: format!("failed to bind gateway to {addr}: {e}"),
            source: Some(Box::new(e)),
        })
}

/// Serve the health router on `listener` until `cancel` fires.
pub async fn serve(
    listener: TcpListener,
    state: HealthState,
    cancel: CancellationToken,
) -> Result<(), WardenError> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "gateway server listening");
    }

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .map_err(|e| WardenError::Gateway {
            message: format!("gateway server error: {e}"),
            source: Some(Box::new(e)),
        })?;

    tracing::info!("gateway server stopped");
    Ok(())
}

/// Bind and serve until `cancel` fires.
pub async fn start_server(
    config: &ServerConfig,
    state: HealthState,
    cancel: CancellationToken,
) -> Result<(), WardenError> {
    let listener = bind(config).await?;
    serve(listener, state, cancel).await
}
