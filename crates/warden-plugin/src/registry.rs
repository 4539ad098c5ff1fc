// SPDX-FileCopyrightText: 2026 Warden Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Live plugin registry for one domain and one plugin kind.
//!
//! The `PluginRegistry` maps plugin ids to `RegistryEntry` records holding the
//! definition a provider was built from and the provider itself. Every
//! transition reports to the shared [`ReadinessTracker`].
//!
//! Transitions on the same plugin id are serialized by a per-id async lock.
//! Transitions on different ids run concurrently.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError};

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use warden_core::{
    Definition, DefinitionStore, DomainId, PluginId, PluginKind, Provider, ProviderFactory,
    ReferenceType, WardenError,
};

use crate::metrics::{self, DeployOutcome};
use crate::readiness::ReadinessTracker;

/// A live provider together with the definition it was built from.
pub struct RegistryEntry<P: ?Sized> {
    pub definition: Arc<Definition>,
    pub provider: Arc<P>,
}

impl<P: ?Sized> Clone for RegistryEntry<P> {
    fn clone(&self) -> Self {
        Self {
            definition: Arc::clone(&self.definition),
            provider: Arc::clone(&self.provider),
        }
    }
}

/// Result of [`PluginRegistry::upsert`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// A new provider was built and installed.
    Deployed,
    /// The cached definition is not older; the existing provider was kept.
    Unchanged,
    /// The factory failed; the id has no provider.
    Failed(String),
    /// The definition belongs elsewhere, or the registry is shut down.
    Rejected,
}

/// Registry of live providers of one kind within one domain.
pub struct PluginRegistry<F: ProviderFactory> {
    domain: DomainId,
    kind: PluginKind,
    factory: Arc<F>,
    store: Arc<dyn DefinitionStore>,
    readiness: Arc<ReadinessTracker>,
    entries: DashMap<PluginId, RegistryEntry<F::Provider>>,
    locks: DashMap<PluginId, Arc<Mutex<()>>>,
    closed: AtomicBool,
    // Held while checking `closed` and marking a plugin pending.
    closing: std::sync::Mutex<()>,
}

impl<F: ProviderFactory> std::fmt::Debug for PluginRegistry<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("domain", &self.domain)
            .field("kind", &self.kind)
            .field("entries", &self.entries.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl<F: ProviderFactory> PluginRegistry<F> {
    /// Create an empty registry. The kind is taken from the factory.
    pub fn new(
        domain: DomainId,
        factory: Arc<F>,
        store: Arc<dyn DefinitionStore>,
        readiness: Arc<ReadinessTracker>,
    ) -> Self {
        let kind = factory.kind();
        Self {
            domain,
            kind,
            factory,
            store,
            readiness,
            entries: DashMap::new(),
            locks: DashMap::new(),
            closed: AtomicBool::new(false),
            closing: std::sync::Mutex::new(()),
        }
    }

    pub fn domain(&self) -> &DomainId {
        &self.domain
    }

    pub fn kind(&self) -> PluginKind {
        self.kind
    }

    pub fn store(&self) -> &Arc<dyn DefinitionStore> {
        &self.store
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Bulk-load every definition of this kind attached to the domain.
    ///
    /// Definitions are upserted one after another; a failing definition is
    /// recorded and never aborts the rest. Returns the number of ids that
    /// ended with a live provider. Only the initial `find_all` can fail.
    pub async fn load(&self) -> Result<usize, WardenError> {
        let definitions = self
            .store
            .find_all(ReferenceType::Domain, self.domain.as_str())
            .await?;

        let mut live = 0;
        let mut failed = 0;
        for definition in definitions.into_iter().filter(|d| d.kind == self.kind) {
            match self.upsert(definition).await {
                UpsertOutcome::Deployed | UpsertOutcome::Unchanged => live += 1,
                UpsertOutcome::Failed(_) => failed += 1,
                UpsertOutcome::Rejected => {}
            }
        }

        info!(
            domain = %self.domain,
            kind = %self.kind,
            live,
            failed,
            "plugin definitions loaded"
        );
        Ok(live)
    }

    /// Install or replace the provider for `definition`.
    ///
    /// A definition that is not newer than the cached one is a no-op that
    /// still reports the id as loaded. Otherwise the old provider is stopped
    /// and removed before the factory runs, so a failed rebuild leaves the id
    /// without a provider.
    pub async fn upsert(&self, definition: Definition) -> UpsertOutcome {
        if definition.domain_id != self.domain || definition.kind != self.kind {
            warn!(
                domain = %self.domain,
                kind = %self.kind,
                plugin = %definition.id,
                definition_domain = %definition.domain_id,
                definition_kind = %definition.kind,
                "definition does not belong to this registry, ignoring"
            );
            return UpsertOutcome::Rejected;
        }

        let id = definition.id.clone();
        let lock = self.lock_for(&id);
        let _guard = lock.lock().await;
        // Checked before marking the id pending, so a shut down registry
        // never recreates readiness state its owner already dropped.
        if !self.begin_transition(&id) {
            debug!(domain = %self.domain, plugin = %id, "registry shut down, refusing upsert");
            return UpsertOutcome::Rejected;
        }

        let unchanged = self
            .entries
            .get(&id)
            .is_some_and(|entry| !definition.supersedes(&entry.definition));
        if unchanged {
            debug!(
                domain = %self.domain,
                plugin = %id,
                updated_at = %definition.updated_at,
                "definition unchanged, keeping provider"
            );
            self.readiness.plugin_loaded(&self.domain, &id);
            metrics::record_deployment(self.kind, DeployOutcome::Unchanged);
            return UpsertOutcome::Unchanged;
        }

        self.teardown(&id).await;

        match self.factory.create(&definition).await {
            Ok(provider) => {
                self.entries.insert(
                    id.clone(),
                    RegistryEntry {
                        definition: Arc::new(definition),
                        provider,
                    },
                );
                // shutdown() may have drained the map while the factory ran.
                if self.is_closed() {
                    debug!(
                        domain = %self.domain,
                        plugin = %id,
                        "registry shut down during provider creation, stopping new provider"
                    );
                    self.teardown(&id).await;
                    return UpsertOutcome::Rejected;
                }
                self.readiness.plugin_loaded(&self.domain, &id);
                metrics::record_deployment(self.kind, DeployOutcome::Success);
                info!(domain = %self.domain, kind = %self.kind, plugin = %id, "plugin deployed");
                UpsertOutcome::Deployed
            }
            Err(e) => {
                let message = e.to_string();
                warn!(
                    domain = %self.domain,
                    kind = %self.kind,
                    plugin = %id,
                    error = %e,
                    "failed to create provider"
                );
                self.readiness.plugin_failed(&self.domain, &id, message.clone());
                metrics::record_deployment(self.kind, DeployOutcome::Failure);
                UpsertOutcome::Failed(message)
            }
        }
    }

    /// Stop and forget the provider for `id`. Undeploying is never a failure.
    ///
    /// Returns `true` when a live provider was removed.
    pub async fn remove(&self, id: &PluginId) -> bool {
        let lock = self.lock_for(id);
        let guard = lock.lock().await;

        let removed = self.teardown(id).await;
        self.readiness.plugin_unloaded(&self.domain, id);
        if removed {
            metrics::record_undeployment(self.kind);
            info!(domain = %self.domain, kind = %self.kind, plugin = %id, "plugin undeployed");
        }

        drop(guard);
        drop(lock);
        self.locks
            .remove_if(id, |_, lock| Arc::strong_count(lock) == 1);
        removed
    }

    /// Tear down `id` and mark it failed, e.g. when its definition vanished.
    pub async fn evict(&self, id: &PluginId, reason: &str) {
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;
        if !self.begin_transition(id) {
            return;
        }

        if self.teardown(id).await {
            metrics::record_undeployment(self.kind);
        }
        warn!(domain = %self.domain, kind = %self.kind, plugin = %id, reason, "plugin evicted");
        self.readiness.plugin_failed(&self.domain, id, reason);
    }

    /// Mark `id` failed without touching its provider, e.g. when the store
    /// could not be read.
    pub async fn mark_failed(&self, id: &PluginId, reason: &str) {
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;
        if !self.begin_transition(id) {
            return;
        }

        self.readiness.plugin_failed(&self.domain, id, reason);
    }

    /// The live provider for `id`, if any. Never blocks on transitions.
    pub fn get(&self, id: &PluginId) -> Option<Arc<F::Provider>> {
        self.entries.get(id).map(|entry| Arc::clone(&entry.provider))
    }

    /// The definition the live provider for `id` was built from.
    pub fn get_definition(&self, id: &PluginId) -> Option<Arc<Definition>> {
        self.entries
            .get(id)
            .map(|entry| Arc::clone(&entry.definition))
    }

    /// Ids with a live provider, sorted.
    pub fn ids(&self) -> Vec<PluginId> {
        let mut ids: Vec<PluginId> = self.entries.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Stop every live provider and refuse further installs.
    ///
    /// Does not wait for transitions blocked inside a factory call; those
    /// stop the provider they built instead of installing it.
    pub async fn shutdown(&self) {
        {
            let _closing = self.closing.lock().unwrap_or_else(PoisonError::into_inner);
            self.closed.store(true, Ordering::SeqCst);
        }

        let ids: Vec<PluginId> = self.entries.iter().map(|e| e.key().clone()).collect();
        let mut stopped = 0;
        for id in &ids {
            if self.teardown(id).await {
                metrics::record_undeployment(self.kind);
                stopped += 1;
            }
        }
        info!(domain = %self.domain, kind = %self.kind, stopped, "plugin registry shut down");
    }

    // Marks `id` pending; false once the registry is shut down.
    fn begin_transition(&self, id: &PluginId) -> bool {
        let _closing = self.closing.lock().unwrap_or_else(PoisonError::into_inner);
        if self.is_closed() {
            return false;
        }
        self.readiness
            .init_plugin_sync(&self.domain, id, Some(self.kind));
        true
    }

    fn lock_for(&self, id: &PluginId) -> Arc<Mutex<()>> {
        self.locks
            .entry(id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone()
    }

    // Removal from the map is atomic, so only one caller ever stops a provider.
    async fn teardown(&self, id: &PluginId) -> bool {
        let Some((_, entry)) = self.entries.remove(id) else {
            return false;
        };
        if let Err(e) = entry.provider.stop().await {
            warn!(
                domain = %self.domain,
                kind = %self.kind,
                plugin = %id,
                error = %e,
                "failed to stop provider"
            );
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use tracing_test::traced_test;

    use super::*;
    use crate::testing::{Gate, MemStore, TestFactory, scope};

    fn registry_with(
        factory: TestFactory,
        definitions: Vec<Definition>,
    ) -> (PluginRegistry<TestFactory>, Arc<TestFactory>, Arc<ReadinessTracker>) {
        let factory = Arc::new(factory);
        let readiness = Arc::new(ReadinessTracker::new());
        let registry = PluginRegistry::new(
            DomainId::from("d1"),
            Arc::clone(&factory),
            Arc::new(MemStore::with(definitions)),
            Arc::clone(&readiness),
        );
        (registry, factory, readiness)
    }

    #[tokio::test]
    async fn upsert_with_same_timestamp_is_idempotent() {
        let (registry, factory, readiness) = registry_with(TestFactory::default(), vec![]);
        let def = scope("s1");

        assert_eq!(registry.upsert(def.clone()).await, UpsertOutcome::Deployed);
        assert_eq!(registry.upsert(def).await, UpsertOutcome::Unchanged);

        assert_eq!(factory.created(), 1);
        let state = readiness.get_domain_state(&DomainId::from("d1")).unwrap();
        assert!(state.plugin(&PluginId::from("s1")).unwrap().success);
        assert!(state.is_synchronized());
    }

    #[tokio::test]
    async fn newer_definition_replaces_provider() {
        let (registry, factory, _) = registry_with(TestFactory::default(), vec![]);
        let first = scope("s1");
        let mut second = first.clone();
        second.updated_at = first.updated_at + Duration::seconds(5);

        registry.upsert(first).await;
        assert_eq!(registry.upsert(second.clone()).await, UpsertOutcome::Deployed);

        assert_eq!(factory.created(), 2);
        assert_eq!(factory.stops(), 1);
        let current = registry.get_definition(&PluginId::from("s1")).unwrap();
        assert_eq!(current.updated_at, second.updated_at);
    }

    #[tokio::test]
    async fn failed_update_is_fail_closed() {
        let (registry, factory, readiness) = registry_with(TestFactory::default(), vec![]);
        let first = scope("s1");
        let mut second = first.clone();
        second.updated_at = first.updated_at + Duration::seconds(1);
        let id = PluginId::from("s1");

        registry.upsert(first).await;
        factory.fail("s1");
        let outcome = registry.upsert(second).await;

        assert!(matches!(outcome, UpsertOutcome::Failed(ref m) if m.contains("directory unreachable")));
        assert!(registry.get(&id).is_none());
        assert_eq!(factory.stops(), 1);
        let state = readiness.get_domain_state(&DomainId::from("d1")).unwrap();
        let status = state.plugin(&id).unwrap();
        assert!(!status.success);
        assert!(status.message.as_deref().unwrap().contains("directory unreachable"));
    }

    #[tokio::test]
    async fn remove_is_not_a_failure() {
        let (registry, factory, readiness) = registry_with(TestFactory::default(), vec![]);
        let id = PluginId::from("s1");
        registry.upsert(scope("s1")).await;

        assert!(registry.remove(&id).await);
        assert!(!registry.remove(&id).await);

        assert!(registry.get(&id).is_none());
        assert_eq!(factory.stops(), 1);
        let state = readiness.get_domain_state(&DomainId::from("d1")).unwrap();
        assert!(state.plugin(&id).is_none());
        assert!(!state.sync_state().contains_key(&id));
    }

    #[tokio::test]
    async fn load_survives_partial_failure_and_skips_other_kinds() {
        let defs = vec![
            scope("a"),
            scope("b"),
            scope("c"),
            Definition::new("idp", PluginKind::IdentityProvider, "d1", "inline-idp", Utc::now()),
            Definition::new("elsewhere", PluginKind::Scope, "d2", "scope", Utc::now()),
        ];
        let factory = TestFactory::default();
        factory.fail("b");
        let (registry, _, readiness) = registry_with(factory, defs);

        assert_eq!(registry.load().await.unwrap(), 2);

        assert!(registry.get(&PluginId::from("a")).is_some());
        assert!(registry.get(&PluginId::from("b")).is_none());
        assert!(registry.get(&PluginId::from("c")).is_some());
        assert!(registry.get(&PluginId::from("idp")).is_none());
        assert_eq!(registry.ids(), vec![PluginId::from("a"), PluginId::from("c")]);

        let domain = DomainId::from("d1");
        assert!(readiness.is_domain_synchronized(&domain));
        assert_eq!(readiness.get_domain_state(&domain).unwrap().failed_plugins().len(), 1);
    }

    #[tokio::test]
    #[traced_test]
    async fn foreign_definition_is_rejected() {
        let (registry, factory, _) = registry_with(TestFactory::default(), vec![]);
        let foreign = Definition::new("s1", PluginKind::Scope, "d2", "scope", Utc::now());

        assert_eq!(registry.upsert(foreign).await, UpsertOutcome::Rejected);
        assert_eq!(factory.created(), 0);
        assert!(logs_contain("does not belong to this registry"));
    }

    #[tokio::test]
    #[traced_test]
    async fn stop_errors_are_swallowed() {
        let factory = TestFactory {
            fail_stop: true,
            ..Default::default()
        };
        let (registry, _, readiness) = registry_with(factory, vec![]);
        let id = PluginId::from("s1");
        registry.upsert(scope("s1")).await;

        assert!(registry.remove(&id).await);
        assert!(logs_contain("failed to stop provider"));
        assert!(readiness.is_domain_synchronized(&DomainId::from("d1")));
    }

    #[tokio::test]
    async fn evict_tears_down_and_marks_failed() {
        let (registry, factory, readiness) = registry_with(TestFactory::default(), vec![]);
        let id = PluginId::from("s1");
        registry.upsert(scope("s1")).await;

        registry.evict(&id, "definition not found").await;

        assert!(registry.get(&id).is_none());
        assert_eq!(factory.stops(), 1);
        let state = readiness.get_domain_state(&DomainId::from("d1")).unwrap();
        assert_eq!(
            state.plugin(&id).unwrap().message.as_deref(),
            Some("definition not found")
        );
    }

    #[tokio::test]
    async fn mark_failed_keeps_provider() {
        let (registry, _, readiness) = registry_with(TestFactory::default(), vec![]);
        let id = PluginId::from("s1");
        registry.upsert(scope("s1")).await;

        registry.mark_failed(&id, "storage error: timeout").await;

        assert!(registry.get(&id).is_some());
        let state = readiness.get_domain_state(&DomainId::from("d1")).unwrap();
        assert!(!state.plugin(&id).unwrap().success);
    }

    #[tokio::test]
    async fn shutdown_stops_everything_and_refuses_installs() {
        let (registry, factory, _) = registry_with(TestFactory::default(), vec![]);
        registry.upsert(scope("a")).await;
        registry.upsert(scope("b")).await;

        registry.shutdown().await;

        assert!(registry.is_empty());
        assert_eq!(factory.stops(), 2);
        assert_eq!(registry.upsert(scope("c")).await, UpsertOutcome::Rejected);
        assert_eq!(factory.created(), 2);
    }

    #[tokio::test]
    async fn shut_down_registry_does_not_recreate_readiness_state() {
        let (registry, factory, readiness) = registry_with(TestFactory::default(), vec![]);
        let domain = DomainId::from("d1");
        registry.upsert(scope("a")).await;
        registry.shutdown().await;
        readiness.remove_domain(&domain);

        assert_eq!(registry.upsert(scope("b")).await, UpsertOutcome::Rejected);
        registry.mark_failed(&PluginId::from("a"), "storage error: timeout").await;
        registry.evict(&PluginId::from("a"), "definition not found").await;

        assert!(readiness.get_domain_state(&domain).is_none());
        assert_eq!(factory.created(), 1);
    }

    #[tokio::test]
    async fn provider_built_during_shutdown_is_stopped() {
        let gate = Arc::new(Gate::default());
        let factory = TestFactory {
            gate: Some(Arc::clone(&gate)),
            ..Default::default()
        };
        let (registry, factory, _) = registry_with(factory, vec![]);
        let registry = Arc::new(registry);

        let pending = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move { registry.upsert(scope("slow")).await })
        };
        gate.entered.notified().await;
        registry.shutdown().await;
        gate.release.notify_one();

        assert_eq!(pending.await.unwrap(), UpsertOutcome::Rejected);
        assert_eq!(factory.created(), 1);
        assert_eq!(factory.stops(), 1);
        assert!(registry.get(&PluginId::from("slow")).is_none());
    }

    #[tokio::test]
    async fn recovered_factory_redeploys_on_next_update() {
        let factory = TestFactory::default();
        factory.fail("s1");
        let (registry, factory, readiness) = registry_with(factory, vec![]);
        let first = scope("s1");
        let mut second = first.clone();
        second.updated_at = first.updated_at + Duration::seconds(1);

        registry.upsert(first).await;
        factory.heal("s1");
        assert_eq!(registry.upsert(second).await, UpsertOutcome::Deployed);

        readiness.update_domain_status(&DomainId::from("d1"), warden_core::DomainStatus::Deployed);
        assert!(readiness.is_domain_stable(&DomainId::from("d1")));
    }
}
