// SPDX-FileCopyrightText: 2026 Warden Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-domain readiness tracking.
//!
//! Every plugin id moves through `UNSEEN -> PENDING -> {SUCCESS, FAILED}` and
//! back to `UNSEEN` only on undeploy. A domain is *synchronized* when no event
//! is pending and *stable* when it is deployed and every plugin built.
//!
//! All mutation goes through [`ReadinessTracker`] methods; each one runs under
//! the domain's map entry, so a removal is never half-visible to readers.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tracing::{debug, warn};
use warden_core::{DomainId, DomainStatus, PluginId, PluginKind};

use crate::metrics;

/// Outcome of the last event processed for one plugin id.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PluginStatus {
    pub id: PluginId,
    pub kind: Option<PluginKind>,
    pub success: bool,
    pub message: Option<String>,
    pub last_sync: DateTime<Utc>,
}

/// Readiness snapshot of one domain.
#[derive(Debug, Clone, Serialize)]
pub struct DomainState {
    status: DomainStatus,
    last_sync: DateTime<Utc>,
    sync_state: HashMap<PluginId, bool>,
    creation_state: HashMap<PluginId, PluginStatus>,
}

impl DomainState {
    fn new(status: DomainStatus) -> Self {
        Self {
            status,
            last_sync: Utc::now(),
            sync_state: HashMap::new(),
            creation_state: HashMap::new(),
        }
    }

    pub fn status(&self) -> DomainStatus {
        self.status
    }

    pub fn last_sync(&self) -> DateTime<Utc> {
        self.last_sync
    }

    /// Per plugin id: `false` while an event is pending.
    pub fn sync_state(&self) -> &HashMap<PluginId, bool> {
        &self.sync_state
    }

    pub fn creation_state(&self) -> &HashMap<PluginId, PluginStatus> {
        &self.creation_state
    }

    pub fn plugin(&self, id: &PluginId) -> Option<&PluginStatus> {
        self.creation_state.get(id)
    }

    /// No plugin has a pending event.
    pub fn is_synchronized(&self) -> bool {
        self.sync_state.values().all(|done| *done)
    }

    /// Deployed, and every tracked plugin was built successfully.
    pub fn is_stable(&self) -> bool {
        self.status == DomainStatus::Deployed
            && self.creation_state.values().all(|plugin| plugin.success)
    }

    /// Plugins whose last build failed.
    pub fn failed_plugins(&self) -> Vec<&PluginStatus> {
        let mut failed: Vec<&PluginStatus> = self
            .creation_state
            .values()
            .filter(|plugin| !plugin.success)
            .collect();
        failed.sort_by(|a, b| a.id.cmp(&b.id));
        failed
    }
}

/// Tracks plugin readiness for every domain of the process.
#[derive(Debug, Default)]
pub struct ReadinessTracker {
    domains: DashMap<DomainId, DomainState>,
}

impl ReadinessTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks an event as pending for `plugin`.
    ///
    /// Merges into any existing status: `success` is kept, and `kind` is only
    /// replaced when a new one is given.
    pub fn init_plugin_sync(&self, domain: &DomainId, plugin: &PluginId, kind: Option<PluginKind>) {
        {
            let mut guard = self
                .domains
                .entry(domain.clone())
                .or_insert_with(|| DomainState::new(DomainStatus::Initializing));
            let state: &mut DomainState = &mut guard;

            state
                .creation_state
                .entry(plugin.clone())
                .and_modify(|status| {
                    if kind.is_some() {
                        status.kind = kind;
                    }
                })
                .or_insert_with(|| PluginStatus {
                    id: plugin.clone(),
                    kind,
                    success: false,
                    message: None,
                    last_sync: Utc::now(),
                });
            state.sync_state.insert(plugin.clone(), false);
        }
        self.refresh_gauges();
    }

    /// Records a successful (or already up-to-date) deployment.
    pub fn plugin_loaded(&self, domain: &DomainId, plugin: &PluginId) {
        self.record_outcome(domain, plugin, None);
    }

    /// Records a failed deployment with an operator-facing message.
    pub fn plugin_failed(&self, domain: &DomainId, plugin: &PluginId, message: impl Into<String>) {
        self.record_outcome(domain, plugin, Some(message.into()));
    }

    fn record_outcome(&self, domain: &DomainId, plugin: &PluginId, failure: Option<String>) {
        {
            let Some(mut guard) = self.domains.get_mut(domain) else {
                warn!(%domain, %plugin, "readiness outcome for a domain that was never initialized, ignoring");
                return;
            };
            let state: &mut DomainState = &mut guard;
            let Some(status) = state.creation_state.get_mut(plugin) else {
                warn!(%domain, %plugin, "readiness outcome for a plugin that was never initialized, ignoring");
                return;
            };

            let now = Utc::now();
            status.success = failure.is_none();
            status.message = failure;
            status.last_sync = now;
            state.sync_state.insert(plugin.clone(), true);
            state.last_sync = now;
        }
        self.refresh_gauges();
    }

    /// Forgets `plugin` entirely. Undeploying is not a failure.
    pub fn plugin_unloaded(&self, domain: &DomainId, plugin: &PluginId) {
        {
            let Some(mut guard) = self.domains.get_mut(domain) else {
                debug!(%domain, %plugin, "plugin unloaded from an untracked domain");
                return;
            };
            let state: &mut DomainState = &mut guard;
            state.sync_state.remove(plugin);
            state.creation_state.remove(plugin);
            state.last_sync = Utc::now();
        }
        self.refresh_gauges();
    }

    /// Sets the domain status, creating the domain state if needed.
    pub fn update_domain_status(&self, domain: &DomainId, status: DomainStatus) {
        {
            let now = Utc::now();
            self.domains
                .entry(domain.clone())
                .and_modify(|state| {
                    state.status = status;
                    state.last_sync = now;
                })
                .or_insert_with(|| DomainState::new(status));
        }
        debug!(%domain, %status, "domain status updated");
        self.refresh_gauges();
    }

    /// Drops all readiness state of an undeployed domain.
    pub fn remove_domain(&self, domain: &DomainId) {
        if self.domains.remove(domain).is_some() {
            debug!(%domain, "domain readiness state removed");
        }
        self.refresh_gauges();
    }

    pub fn get_domain_state(&self, domain: &DomainId) -> Option<DomainState> {
        self.domains.get(domain).map(|state| state.clone())
    }

    pub fn get_domain_states(&self) -> HashMap<DomainId, DomainState> {
        self.domains
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    pub fn get_unstable_domains(&self) -> HashSet<DomainId> {
        self.domains
            .iter()
            .filter(|entry| !entry.value().is_stable())
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Unknown domains are not stable.
    pub fn is_domain_stable(&self, domain: &DomainId) -> bool {
        self.domains
            .get(domain)
            .is_some_and(|state| state.is_stable())
    }

    /// Unknown domains are not synchronized.
    pub fn is_domain_synchronized(&self, domain: &DomainId) -> bool {
        self.domains
            .get(domain)
            .is_some_and(|state| state.is_synchronized())
    }

    // Must run with no domain guard held.
    fn refresh_gauges(&self) {
        let tracked = self.domains.len();
        let unstable = self
            .domains
            .iter()
            .filter(|entry| !entry.value().is_stable())
            .count();
        metrics::set_domain_counts(tracked, unstable);
    }
}
