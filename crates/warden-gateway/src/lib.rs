// SPDX-FileCopyrightText: 2026 Warden Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Health and readiness HTTP surface for the Warden plugin runtime.
//!
//! Exposes the readiness tracker to load balancers and operators:
//!
//! - `GET /health`: liveness and uptime
//! - `GET /health/readiness`: 200 when every domain is stable and synchronized, 503 otherwise
//! - `GET /health/domains/{domain}`: per-plugin readiness of one domain
//! - `GET /metrics`: Prometheus text, when an exporter is wired in

pub mod handlers;
pub mod server;

pub use handlers::{DomainReport, HealthResponse, PluginReport, ReadinessResponse};
pub use server::{HealthState, MetricsRender, ServerConfig, bind, router, serve, start_server};
