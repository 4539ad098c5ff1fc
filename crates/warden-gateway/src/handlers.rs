// SPDX-FileCopyrightText: 2026 Warden Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP request handlers for the health surface.
//!
//! Handles GET /health, /health/readiness, /health/domains/{domain} and /metrics.

use axum::{
    Json,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use warden_core::{DomainId, DomainStatus};
use warden_plugin::PluginStatus;

use crate::server::HealthState;

/// Response body for GET /health.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
}

/// Response body for GET /health/readiness.
#[derive(Debug, Serialize, Deserialize)]
pub struct ReadinessResponse {
    /// Every tracked domain is stable and synchronized.
    pub ready: bool,
    /// Number of tracked domains.
    pub domains: usize,
    /// Domains that are not stable or still have pending events, sorted.
    pub unstable: Vec<DomainId>,
}

/// Response body for GET /health/domains/{domain}.
#[derive(Debug, Serialize, Deserialize)]
pub struct DomainReport {
    pub domain: DomainId,
    pub status: DomainStatus,
    pub stable: bool,
    pub synchronized: bool,
    pub last_sync: DateTime<Utc>,
    /// Last known outcome per plugin, sorted by id.
    pub plugins: Vec<PluginReport>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PluginReport {
    pub id: String,
    pub kind: Option<String>,
    pub success: bool,
    /// `false` while an event for this plugin is pending.
    pub synchronized: bool,
    pub message: Option<String>,
    pub last_sync: DateTime<Utc>,
}

impl PluginReport {
    fn new(status: &PluginStatus, synchronized: bool) -> Self {
        Self {
            id: status.id.to_string(),
            kind: status.kind.map(|kind| kind.to_string()),
            success: status.success,
            synchronized,
            message: status.message.clone(),
            last_sync: status.last_sync,
        }
    }
}

/// Error response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// GET /health
///
/// Liveness only: answers as long as the process serves requests.
pub async fn get_health(State(state): State<HealthState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

/// GET /health/readiness
///
/// 200 when every domain is stable and synchronized, 503 otherwise.
pub async fn get_readiness(State(state): State<HealthState>) -> Response {
    let states = state.readiness.get_domain_states();
    let mut unstable: Vec<DomainId> = states
        .iter()
        .filter(|(_, domain)| !(domain.is_stable() && domain.is_synchronized()))
        .map(|(id, _)| id.clone())
        .collect();
    unstable.sort();

    let ready = unstable.is_empty();
    let body = ReadinessResponse {
        ready,
        domains: states.len(),
        unstable,
    };
    let code = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(body)).into_response()
}

/// GET /health/domains/{domain}
pub async fn get_domain(
    State(state): State<HealthState>,
    Path(domain): Path<String>,
) -> Response {
    let domain = DomainId::from(domain);
    let Some(snapshot) = state.readiness.get_domain_state(&domain) else {
        return (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("unknown domain `{domain}`"),
            }),
        )
            .into_response();
    };

    let mut plugins: Vec<PluginReport> = snapshot
        .creation_state()
        .values()
        .map(|status| {
            let synchronized = snapshot
                .sync_state()
                .get(&status.id)
                .copied()
                .unwrap_or(true);
            PluginReport::new(status, synchronized)
        })
        .collect();
    plugins.sort_by(|a, b| a.id.cmp(&b.id));

    Json(DomainReport {
        stable: snapshot.is_stable(),
        synchronized: snapshot.is_synchronized(),
        status: snapshot.status(),
        last_sync: snapshot.last_sync(),
        domain,
        plugins,
    })
    .into_response()
}

/// GET /metrics
///
/// Prometheus text exposition, or 404 when no exporter is installed.
pub async fn get_metrics(State(state): State<HealthState>) -> Response {
    match &state.prometheus_render {
        Some(render) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            render(),
        )
            .into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: "metrics are not enabled".to_string(),
            }),
        )
            .into_response(),
    }
}
