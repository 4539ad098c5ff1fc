// SPDX-FileCopyrightText: 2026 Warden Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock provider factory for deterministic testing.
//!
//! `MockFactory` builds `MockProvider`s and counts every create and stop, so
//! tests can assert that no provider leaks or is stopped twice.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use warden_core::{Definition, PluginId, PluginKind, Provider, ProviderFactory, WardenError};

/// A provider that remembers which definition built it.
pub struct MockProvider {
    pub id: PluginId,
    /// `updated_at` of the definition, as RFC 3339.
    pub version: String,
    stopped: AtomicBool,
    stops: Arc<AtomicUsize>,
    live: Arc<AtomicUsize>,
}

impl MockProvider {
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Provider for MockProvider {
    async fn stop(&self) -> Result<(), WardenError> {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return Err(WardenError::Internal(format!(
                "mock provider {} stopped twice",
                self.id
            )));
        }
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.live.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Provider factory with scriptable failures and latency.
pub struct MockFactory {
    kind: PluginKind,
    failing: Mutex<HashSet<PluginId>>,
    delay: Mutex<Option<Duration>>,
    created: AtomicUsize,
    stops: Arc<AtomicUsize>,
    live: Arc<AtomicUsize>,
}

impl MockFactory {
    pub fn new(kind: PluginKind) -> Self {
        Self {
            kind,
            failing: Mutex::new(HashSet::new()),
            delay: Mutex::new(None),
            created: AtomicUsize::new(0),
            stops: Arc::new(AtomicUsize::new(0)),
            live: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Make every later `create` for `id` fail.
    pub fn fail(&self, id: &str) {
        self.failing_ids().insert(PluginId::from(id));
    }

    pub fn heal(&self, id: &str) {
        self.failing_ids().remove(&PluginId::from(id));
    }

    /// Sleep this long in every later `create`.
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock().unwrap_or_else(PoisonError::into_inner) = delay;
    }

    /// Providers created successfully.
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    /// Providers stopped.
    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    /// Providers created and not yet stopped.
    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    fn failing_ids(&self) -> std::sync::MutexGuard<'_, HashSet<PluginId>> {
        self.failing.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl ProviderFactory for MockFactory {
    type Provider = MockProvider;

    fn kind(&self) -> PluginKind {
        self.kind
    }

    async fn create(&self, definition: &Definition) -> Result<Arc<MockProvider>, WardenError> {
        let delay = *self.delay.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.failing_ids().contains(&definition.id) {
            return Err(WardenError::provider(
                self.kind,
                format!("mock failure for {}", definition.id),
            ));
        }

        self.created.fetch_add(1, Ordering::SeqCst);
        self.live.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MockProvider {
            id: definition.id.clone(),
            version: definition.updated_at.to_rfc3339(),
            stopped: AtomicBool::new(false),
            stops: Arc::clone(&self.stops),
            live: Arc::clone(&self.live),
        }))
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    #[tokio::test]
    async fn counts_creates_and_stops() {
        let factory = MockFactory::new(PluginKind::Scope);
        let definition = Definition::new("openid", PluginKind::Scope, "d1", "scope", Utc::now());

        let provider = factory.create(&definition).await.unwrap();
        assert_eq!(provider.id, PluginId::from("openid"));
        assert_eq!((factory.created(), factory.live()), (1, 1));

        provider.stop().await.unwrap();
        assert!(provider.is_stopped());
        assert_eq!((factory.stops(), factory.live()), (1, 0));
        assert!(provider.stop().await.is_err());
        assert_eq!(factory.stops(), 1);
    }

    #[tokio::test]
    async fn scripted_failures() {
        let factory = MockFactory::new(PluginKind::IdentityProvider);
        let definition =
            Definition::new("ldap", PluginKind::IdentityProvider, "d1", "ldap-idp", Utc::now());

        factory.fail("ldap");
        assert!(factory.create(&definition).await.is_err());
        factory.heal("ldap");
        assert!(factory.create(&definition).await.is_ok());
        assert_eq!(factory.created(), 1);
    }
}
