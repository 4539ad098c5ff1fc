// SPDX-FileCopyrightText: 2026 Warden Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metric descriptions for everything the runtime records.

use metrics::{describe_counter, describe_gauge};
use warden_plugin::metrics::{
    DEPLOYMENTS_TOTAL, TRACKED_DOMAINS, UNDEPLOYMENTS_TOTAL, UNSTABLE_DOMAINS,
};

/// Register all Warden metric descriptions.
///
/// Called once at startup after the recorder is installed.
pub fn register_metrics() {
    describe_counter!(
        DEPLOYMENTS_TOTAL,
        "Plugin deployment attempts by kind and outcome"
    );
    describe_counter!(UNDEPLOYMENTS_TOTAL, "Plugins removed from a registry by kind");
    describe_gauge!(TRACKED_DOMAINS, "Domains known to the readiness tracker");
    describe_gauge!(
        UNSTABLE_DOMAINS,
        "Domains with at least one failed or unsynchronized plugin"
    );
}
