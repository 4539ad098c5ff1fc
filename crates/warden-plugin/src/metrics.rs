// SPDX-FileCopyrightText: 2026 Warden Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Registry metrics recorded through the metrics-rs facade.
//!
//! Without an installed recorder these calls are no-ops.

use warden_core::PluginKind;

pub const DEPLOYMENTS_TOTAL: &str = "warden_plugin_deployments_total";
pub const UNDEPLOYMENTS_TOTAL: &str = "warden_plugin_undeployments_total";
pub const UNSTABLE_DOMAINS: &str = "warden_unstable_domains";
pub const TRACKED_DOMAINS: &str = "warden_tracked_domains";

/// Outcome label for [`DEPLOYMENTS_TOTAL`].
#[derive(Debug, Clone, Copy)]
pub enum DeployOutcome {
    Success,
    Failure,
    Unchanged,
}

impl DeployOutcome {
    fn as_str(self) -> &'static str {
        match self {
            DeployOutcome::Success => "success",
            DeployOutcome::Failure => "failure",
            DeployOutcome::Unchanged => "unchanged",
        }
    }
}

pub fn record_deployment(kind: PluginKind, outcome: DeployOutcome) {
    metrics::counter!(
        DEPLOYMENTS_TOTAL,
        "kind" => kind.to_string(),
        "outcome" => outcome.as_str()
    )
    .increment(1);
}

pub fn record_undeployment(kind: PluginKind) {
    metrics::counter!(UNDEPLOYMENTS_TOTAL, "kind" => kind.to_string()).increment(1);
}

pub fn set_domain_counts(tracked: usize, unstable: usize) {
    metrics::gauge!(TRACKED_DOMAINS).set(tracked as f64);
    metrics::gauge!(UNSTABLE_DOMAINS).set(unstable as f64);
}
