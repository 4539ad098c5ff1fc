// SPDX-FileCopyrightText: 2026 Warden Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end integration testing.
//!
//! `TestHarness` wires an event bus, a [`FlakyStore`], a shared readiness
//! tracker and an [`ExtensionManager`] with one [`MockFactory`] per plugin
//! kind. Definitions written through the harness are announced on the bus
//! exactly like administrative writes in production.

use std::sync::Arc;

use chrono::{Duration, Utc};
use warden_bus::EventBus;
use warden_core::{
    Definition, DomainId, EventAction, PluginId, PluginKind, StartupPolicy, WardenError,
};
use warden_plugin::{DomainExtensions, ExtensionManager, ReadinessTracker};

use crate::mock_factory::{MockFactory, MockProvider};
use crate::store::FlakyStore;

/// A definition of `kind` in `domain`, stamped now.
pub fn definition(id: &str, kind: PluginKind, domain: &str) -> Definition {
    let plugin_type = match kind {
        PluginKind::IdentityProvider => "inline-idp",
        PluginKind::DeviceIdentifier => "fingerprintjs-v3-community",
        PluginKind::Scope => "scope",
    };
    Definition::new(id, kind, domain, plugin_type, Utc::now())
}

/// A copy of `definition` that supersedes it.
pub fn newer(definition: &Definition) -> Definition {
    let mut next = definition.clone();
    next.updated_at = definition.updated_at + Duration::seconds(1);
    next
}

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    policy: StartupPolicy,
    definitions: Vec<Definition>,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            policy: StartupPolicy::Blocking,
            definitions: Vec::new(),
        }
    }

    pub fn startup_policy(mut self, policy: StartupPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Seed the store before any domain is deployed.
    pub fn with_definition(mut self, definition: Definition) -> Self {
        self.definitions.push(definition);
        self
    }

    pub fn build(self) -> TestHarness {
        let bus = Arc::new(EventBus::new());
        let store = Arc::new(FlakyStore::new(Arc::clone(&bus)));
        for definition in self.definitions {
            store.put(definition);
        }

        let readiness = Arc::new(ReadinessTracker::new());
        let identity_providers = Arc::new(MockFactory::new(PluginKind::IdentityProvider));
        let device_identifiers = Arc::new(MockFactory::new(PluginKind::DeviceIdentifier));
        let scopes = Arc::new(MockFactory::new(PluginKind::Scope));

        let manager = ExtensionManager::builder(store.clone(), Arc::clone(&bus))
            .readiness(Arc::clone(&readiness))
            .startup_policy(self.policy)
            .with_kind(Arc::clone(&identity_providers))
            .with_kind(Arc::clone(&device_identifiers))
            .with_kind(Arc::clone(&scopes))
            .build();

        TestHarness {
            bus,
            store,
            readiness,
            manager,
            identity_providers,
            device_identifiers,
            scopes,
        }
    }
}

/// A complete registry stack backed by mocks.
pub struct TestHarness {
    pub bus: Arc<EventBus>,
    pub store: Arc<FlakyStore>,
    pub readiness: Arc<ReadinessTracker>,
    pub manager: ExtensionManager,
    pub identity_providers: Arc<MockFactory>,
    pub device_identifiers: Arc<MockFactory>,
    pub scopes: Arc<MockFactory>,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    pub fn factory(&self, kind: PluginKind) -> &Arc<MockFactory> {
        match kind {
            PluginKind::IdentityProvider => &self.identity_providers,
            PluginKind::DeviceIdentifier => &self.device_identifiers,
            PluginKind::Scope => &self.scopes,
        }
    }

    pub async fn deploy(&self, domain: &str) -> Result<Arc<DomainExtensions>, WardenError> {
        self.manager.deploy_domain(DomainId::from(domain)).await
    }

    /// Store a definition and announce it.
    pub fn put(&self, definition: Definition) -> EventAction {
        self.store.put(definition)
    }

    /// Delete a definition and announce the undeploy.
    pub fn delete(&self, id: &str) -> Option<Definition> {
        self.store.delete(id)
    }

    /// Wait until `domain` has applied every announced change.
    pub async fn settle(&self, domain: &str) {
        if let Some(extensions) = self.manager.domain(&DomainId::from(domain)) {
            extensions.settle().await;
        }
    }

    pub fn provider(&self, domain: &str, kind: PluginKind, id: &str) -> Option<Arc<MockProvider>> {
        self.manager
            .domain(&DomainId::from(domain))?
            .registry::<MockFactory>(kind)?
            .get(&PluginId::from(id))
    }

    /// Live plugin ids of `kind` in `domain`, sorted.
    pub fn ids(&self, domain: &str, kind: PluginKind) -> Vec<String> {
        self.manager
            .domain(&DomainId::from(domain))
            .map(|extensions| {
                extensions
                    .ids(kind)
                    .into_iter()
                    .map(|id| id.to_string())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn is_stable(&self, domain: &str) -> bool {
        self.readiness.is_domain_stable(&DomainId::from(domain))
    }

    pub fn is_synchronized(&self, domain: &str) -> bool {
        self.readiness
            .is_domain_synchronized(&DomainId::from(domain))
    }

    /// Every provider created by any factory has been stopped.
    pub fn no_live_providers(&self) -> bool {
        PluginKind::ALL
            .iter()
            .all(|kind| self.factory(*kind).live() == 0)
    }
}
