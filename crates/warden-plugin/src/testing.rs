// SPDX-FileCopyrightText: 2026 Warden Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-crate doubles shared by the unit tests.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::Notify;
use warden_core::{
    Definition, DefinitionStore, PluginId, PluginKind, Provider, ProviderFactory, ReferenceType,
    WardenError,
};

pub struct TestProvider {
    stops: Arc<AtomicUsize>,
    live: Arc<AtomicUsize>,
    fail_stop: bool,
}

#[async_trait]
impl Provider for TestProvider {
    async fn stop(&self) -> Result<(), WardenError> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.live.fetch_sub(1, Ordering::SeqCst);
        if self.fail_stop {
            return Err(WardenError::provider(PluginKind::Scope, "socket already closed"));
        }
        Ok(())
    }
}

/// Parks `create` until released.
#[derive(Default)]
pub struct Gate {
    pub entered: Notify,
    pub release: Notify,
}

pub struct TestFactory {
    pub kind: PluginKind,
    pub created: AtomicUsize,
    pub stops: Arc<AtomicUsize>,
    pub live: Arc<AtomicUsize>,
    pub failing: Mutex<HashSet<String>>,
    pub fail_stop: bool,
    pub gate: Option<Arc<Gate>>,
}

impl Default for TestFactory {
    fn default() -> Self {
        Self {
            kind: PluginKind::Scope,
            created: AtomicUsize::new(0),
            stops: Arc::new(AtomicUsize::new(0)),
            live: Arc::new(AtomicUsize::new(0)),
            failing: Mutex::new(HashSet::new()),
            fail_stop: false,
            gate: None,
        }
    }
}

impl TestFactory {
    pub fn fail(&self, id: &str) {
        self.failing.lock().unwrap().insert(id.to_string());
    }

    pub fn heal(&self, id: &str) {
        self.failing.lock().unwrap().remove(id);
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProviderFactory for TestFactory {
    type Provider = TestProvider;

    fn kind(&self) -> PluginKind {
        self.kind
    }

    async fn create(&self, definition: &Definition) -> Result<Arc<TestProvider>, WardenError> {
        if let Some(gate) = &self.gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
        if self.failing.lock().unwrap().contains(definition.id.as_str()) {
            return Err(WardenError::provider(self.kind, "directory unreachable"));
        }
        self.created.fetch_add(1, Ordering::SeqCst);
        self.live.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(TestProvider {
            stops: Arc::clone(&self.stops),
            live: Arc::clone(&self.live),
            fail_stop: self.fail_stop,
        }))
    }
}

#[derive(Default)]
pub struct MemStore {
    definitions: DashMap<PluginId, Definition>,
    unavailable: AtomicBool,
}

impl MemStore {
    pub fn with(definitions: Vec<Definition>) -> Self {
        let store = Self::default();
        for definition in definitions {
            store.put(definition);
        }
        store
    }

    pub fn put(&self, definition: Definition) {
        self.definitions.insert(definition.id.clone(), definition);
    }

    pub fn delete(&self, id: &str) {
        self.definitions.remove(&PluginId::from(id));
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), WardenError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(WardenError::storage(std::io::Error::other("store offline")));
        }
        Ok(())
    }
}

#[async_trait]
impl DefinitionStore for MemStore {
    async fn find_all(
        &self,
        reference_type: ReferenceType,
        reference_id: &str,
    ) -> Result<Vec<Definition>, WardenError> {
        self.check()?;
        Ok(self
            .definitions
            .iter()
            .filter(|d| d.reference_type == reference_type && d.domain_id.as_str() == reference_id)
            .map(|d| d.value().clone())
            .collect())
    }

    async fn find_by_id(&self, id: &PluginId) -> Result<Option<Definition>, WardenError> {
        self.check()?;
        Ok(self.definitions.get(id).map(|d| d.value().clone()))
    }
}

pub fn scope(id: &str) -> Definition {
    Definition::new(id, PluginKind::Scope, "d1", "scope", Utc::now())
}
