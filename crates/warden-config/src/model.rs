// SPDX-FileCopyrightText: 2026 Warden Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Warden plugin runtime.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use warden_core::StartupPolicy;

/// Top-level Warden configuration.
///
/// Every section is optional and defaults to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WardenConfig {
    /// Log level and output format.
    #[serde(default)]
    pub log: LogConfig,

    /// Plugin registry behaviour.
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Where plugin definitions are read from.
    #[serde(default)]
    pub definitions: DefinitionsConfig,

    /// Health and readiness HTTP surface.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Prometheus metrics export.
    #[serde(default)]
    pub prometheus: PrometheusConfig,
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable, one event per line.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LogConfig {
    /// Logging level (trace, debug, info, warn, error). `RUST_LOG` wins when set.
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RegistryConfig {
    /// `blocking` waits for every domain's bulk load before serving;
    /// `non-blocking` serves immediately and loads in the background.
    #[serde(default)]
    pub startup_policy: StartupPolicy,

    /// Domains to deploy. Empty means every subdirectory of
    /// `definitions.path`.
    #[serde(default)]
    pub domains: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DefinitionsConfig {
    /// Root directory holding one subdirectory of definition files per domain.
    #[serde(default = "default_definitions_path")]
    pub path: PathBuf,

    /// Redeploy plugins when definition files change.
    #[serde(default = "default_true")]
    pub watch: bool,

    /// Quiet period before a burst of file changes is applied.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

impl Default for DefinitionsConfig {
    fn default() -> Self {
        Self {
            path: default_definitions_path(),
            watch: true,
            debounce_ms: default_debounce_ms(),
        }
    }
}

fn default_definitions_path() -> PathBuf {
    PathBuf::from("definitions")
}

fn default_debounce_ms() -> u64 {
    500
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    /// Serve the health endpoints.
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8092
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PrometheusConfig {
    /// Install the Prometheus recorder and serve `/metrics` on the gateway.
    #[serde(default)]
    pub enabled: bool,
}
