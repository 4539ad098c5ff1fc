// SPDX-FileCopyrightText: 2026 Warden Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-domain grouping of registry lifecycles.
//!
//! An [`ExtensionManager`] holds the `kind -> factory` table wired at startup
//! and, for every deployed domain, a [`DomainExtensions`] running one
//! [`RegistryLifecycle`] per kind. Domains are fully independent: each has
//! its own registries, subscriptions, and readiness state.

use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::future::join_all;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use warden_bus::EventBus;
use warden_core::{
    DefinitionStore, DomainId, DomainStatus, PluginId, PluginKind, ProviderFactory,
    StartupPolicy, WardenError,
};

use crate::lifecycle::RegistryLifecycle;
use crate::readiness::ReadinessTracker;
use crate::registry::PluginRegistry;

/// Type-erased view of a [`RegistryLifecycle`].
#[async_trait]
pub trait ManagedRegistry: Send + Sync + 'static {
    fn kind(&self) -> PluginKind;

    async fn start(&self) -> Result<(), WardenError>;

    async fn loaded(&self) -> Result<usize, WardenError>;

    async fn settle(&self);

    async fn stop(&self);

    /// Ids with a live provider.
    fn ids(&self) -> Vec<PluginId>;

    fn as_any(&self) -> &dyn Any;
}

#[async_trait]
impl<F: ProviderFactory> ManagedRegistry for RegistryLifecycle<F> {
    fn kind(&self) -> PluginKind {
        RegistryLifecycle::kind(self)
    }

    async fn start(&self) -> Result<(), WardenError> {
        RegistryLifecycle::start(self).await
    }

    async fn loaded(&self) -> Result<usize, WardenError> {
        RegistryLifecycle::loaded(self).await
    }

    async fn settle(&self) {
        RegistryLifecycle::settle(self).await
    }

    async fn stop(&self) {
        RegistryLifecycle::stop(self).await
    }

    fn ids(&self) -> Vec<PluginId> {
        self.registry().ids()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Builds the lifecycle of one kind for a given domain.
trait KindBinding: Send + Sync {
    fn kind(&self) -> PluginKind;

    fn instantiate(&self, domain: DomainId, shared: &Shared) -> Arc<dyn ManagedRegistry>;
}

struct FactoryBinding<F: ProviderFactory>(Arc<F>);

impl<F: ProviderFactory> KindBinding for FactoryBinding<F> {
    fn kind(&self) -> PluginKind {
        self.0.kind()
    }

    fn instantiate(&self, domain: DomainId, shared: &Shared) -> Arc<dyn ManagedRegistry> {
        Arc::new(RegistryLifecycle::new_member(
            domain,
            Arc::clone(&self.0),
            Arc::clone(&shared.store),
            Arc::clone(&shared.bus),
            Arc::clone(&shared.readiness),
            shared.policy,
        ))
    }
}

struct Shared {
    store: Arc<dyn DefinitionStore>,
    bus: Arc<EventBus>,
    readiness: Arc<ReadinessTracker>,
    policy: StartupPolicy,
}

/// Builder for [`ExtensionManager`].
pub struct ExtensionManagerBuilder {
    store: Arc<dyn DefinitionStore>,
    bus: Arc<EventBus>,
    readiness: Option<Arc<ReadinessTracker>>,
    policy: StartupPolicy,
    bindings: Vec<Box<dyn KindBinding>>,
}

impl ExtensionManagerBuilder {
    pub fn new(store: Arc<dyn DefinitionStore>, bus: Arc<EventBus>) -> Self {
        Self {
            store,
            bus,
            readiness: None,
            policy: StartupPolicy::default(),
            bindings: Vec::new(),
        }
    }

    /// Share an existing tracker, e.g. with the health endpoint.
    pub fn readiness(mut self, readiness: Arc<ReadinessTracker>) -> Self {
        self.readiness = Some(readiness);
        self
    }

    pub fn startup_policy(mut self, policy: StartupPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Register the factory for its kind. A later factory for the same kind
    /// replaces the earlier one.
    pub fn with_kind<F: ProviderFactory>(mut self, factory: Arc<F>) -> Self {
        let kind = factory.kind();
        if let Some(pos) = self.bindings.iter().position(|b| b.kind() == kind) {
            warn!(%kind, "provider factory registered twice, replacing");
            self.bindings.remove(pos);
        }
        self.bindings.push(Box::new(FactoryBinding(factory)));
        self
    }

    pub fn build(self) -> ExtensionManager {
        ExtensionManager {
            shared: Shared {
                store: self.store,
                bus: self.bus,
                readiness: self
                    .readiness
                    .unwrap_or_else(|| Arc::new(ReadinessTracker::new())),
                policy: self.policy,
            },
            bindings: self.bindings,
            domains: DashMap::new(),
            transitions: DashMap::new(),
        }
    }
}

/// Every deployed domain of the process.
pub struct ExtensionManager {
    shared: Shared,
    bindings: Vec<Box<dyn KindBinding>>,
    domains: DashMap<DomainId, Arc<DomainExtensions>>,
    // Serializes deploy and undeploy of the same domain.
    transitions: DashMap<DomainId, Arc<tokio::sync::Mutex<()>>>,
}

impl ExtensionManager {
    pub fn builder(store: Arc<dyn DefinitionStore>, bus: Arc<EventBus>) -> ExtensionManagerBuilder {
        ExtensionManagerBuilder::new(store, bus)
    }

    pub fn readiness(&self) -> &Arc<ReadinessTracker> {
        &self.shared.readiness
    }

    pub fn startup_policy(&self) -> StartupPolicy {
        self.shared.policy
    }

    /// Kinds with a registered factory, in registration order.
    pub fn kinds(&self) -> Vec<PluginKind> {
        self.bindings.iter().map(|b| b.kind()).collect()
    }

    /// Start one registry per kind for `domain`.
    ///
    /// Deploying an already deployed domain returns the running instance.
    /// A domain whose start failed stays listed with status `ERROR` until the
    /// next deploy, which stops it and starts it afresh.
    pub async fn deploy_domain(
        &self,
        domain: DomainId,
    ) -> Result<Arc<DomainExtensions>, WardenError> {
        let lock = self.lock_for(&domain);
        let _guard = lock.lock().await;

        let failed = self
            .domains
            .remove_if(&domain, |_, existing| existing.has_failed());
        if let Some((_, failed)) = failed {
            warn!(%domain, "domain failed to start earlier, redeploying");
            failed.stop().await;
        }

        let extensions = match self.domains.entry(domain.clone()) {
            Entry::Occupied(existing) => {
                debug!(%domain, "domain already deployed");
                return Ok(Arc::clone(existing.get()));
            }
            Entry::Vacant(vacant) => {
                let registries = self
                    .bindings
                    .iter()
                    .map(|binding| binding.instantiate(domain.clone(), &self.shared))
                    .collect();
                let extensions = Arc::new(DomainExtensions {
                    domain: domain.clone(),
                    policy: self.shared.policy,
                    readiness: Arc::clone(&self.shared.readiness),
                    registries,
                    stopping: AtomicBool::new(false),
                    failed: AtomicBool::new(false),
                    background: Mutex::new(None),
                });
                vacant.insert(Arc::clone(&extensions));
                extensions
            }
        };

        extensions.start().await?;
        Ok(extensions)
    }

    /// Stop every registry of `domain` and forget it. Returns `false` when
    /// the domain was not deployed.
    pub async fn undeploy_domain(&self, domain: &DomainId) -> bool {
        let lock = self.lock_for(domain);
        let _guard = lock.lock().await;
        let Some((_, extensions)) = self.domains.remove(domain) else {
            return false;
        };
        extensions.stop().await;
        true
    }

    pub fn domain(&self, domain: &DomainId) -> Option<Arc<DomainExtensions>> {
        self.domains.get(domain).map(|d| Arc::clone(d.value()))
    }

    /// Deployed domains, sorted.
    pub fn domains(&self) -> Vec<DomainId> {
        let mut domains: Vec<DomainId> = self.domains.iter().map(|d| d.key().clone()).collect();
        domains.sort();
        domains
    }

    fn lock_for(&self, domain: &DomainId) -> Arc<tokio::sync::Mutex<()>> {
        self.transitions
            .entry(domain.clone())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .value()
            .clone()
    }

    /// Undeploy every domain.
    pub async fn shutdown(&self) {
        let domains = self.domains();
        info!(count = domains.len(), "shutting down plugin registries");
        for domain in &domains {
            self.undeploy_domain(domain).await;
        }
    }
}

/// The registries of one domain, one per plugin kind.
pub struct DomainExtensions {
    domain: DomainId,
    policy: StartupPolicy,
    readiness: Arc<ReadinessTracker>,
    registries: Vec<Arc<dyn ManagedRegistry>>,
    stopping: AtomicBool,
    failed: AtomicBool,
    background: Mutex<Option<JoinHandle<()>>>,
}

impl DomainExtensions {
    pub fn domain(&self) -> &DomainId {
        &self.domain
    }

    pub fn kinds(&self) -> Vec<PluginKind> {
        self.registries.iter().map(|r| r.kind()).collect()
    }

    /// True once a registry failed to start or to finish its bulk load.
    pub fn has_failed(&self) -> bool {
        self.failed.load(Ordering::SeqCst)
    }

    /// Typed access to the registry of `kind`, built by factory type `F`.
    pub fn registry<F: ProviderFactory>(&self, kind: PluginKind) -> Option<Arc<PluginRegistry<F>>> {
        self.registries
            .iter()
            .filter(|r| r.kind() == kind)
            .find_map(|r| r.as_any().downcast_ref::<RegistryLifecycle<F>>())
            .map(|lifecycle| Arc::clone(lifecycle.registry()))
    }

    /// Live plugin ids of `kind`.
    pub fn ids(&self, kind: PluginKind) -> Vec<PluginId> {
        self.registries
            .iter()
            .find(|r| r.kind() == kind)
            .map(|r| r.ids())
            .unwrap_or_default()
    }

    async fn start(self: &Arc<Self>) -> Result<(), WardenError> {
        self.readiness
            .update_domain_status(&self.domain, DomainStatus::Initializing);

        let results = join_all(self.registries.iter().map(|r| r.start())).await;
        if let Some(e) = results.into_iter().find_map(Result::err) {
            error!(domain = %self.domain, error = %e, "domain failed to start");
            self.failed.store(true, Ordering::SeqCst);
            self.readiness
                .update_domain_status(&self.domain, DomainStatus::Error);
            return Err(e);
        }

        match self.policy {
            StartupPolicy::Blocking => {
                self.readiness
                    .update_domain_status(&self.domain, DomainStatus::Deployed);
                info!(domain = %self.domain, "domain deployed");
            }
            StartupPolicy::NonBlocking => {
                let this = Arc::clone(self);
                let handle = tokio::spawn(async move { this.finish_background_load().await });
                *self
                    .background
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner) = Some(handle);
                debug!(domain = %self.domain, "domain loading in background");
            }
        }
        Ok(())
    }

    async fn finish_background_load(&self) {
        let results = join_all(self.registries.iter().map(|r| r.loaded())).await;
        if self.stopping.load(Ordering::SeqCst) {
            return;
        }
        match results.into_iter().find_map(Result::err) {
            None => {
                self.readiness
                    .update_domain_status(&self.domain, DomainStatus::Deployed);
                info!(domain = %self.domain, "domain deployed");
            }
            Some(e) => {
                error!(domain = %self.domain, error = %e, "background load failed");
                self.failed.store(true, Ordering::SeqCst);
                self.readiness
                    .update_domain_status(&self.domain, DomainStatus::Error);
            }
        }
    }

    /// Wait until every registry loaded and drained its queued transitions,
    /// and the domain status reflects the load.
    pub async fn settle(&self) {
        let background = self
            .background
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = background {
            let _ = handle.await;
        }
        join_all(self.registries.iter().map(|r| r.settle())).await;
    }

    async fn stop(&self) {
        self.stopping.store(true, Ordering::SeqCst);
        self.readiness
            .update_domain_status(&self.domain, DomainStatus::Removing);
        join_all(self.registries.iter().map(|r| r.stop())).await;
        if let Some(handle) = self
            .background
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
        // Member lifecycles leave the shared domain state to us.
        self.readiness.remove_domain(&self.domain);
        info!(domain = %self.domain, "domain undeployed");
    }
}
