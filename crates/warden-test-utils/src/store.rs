// SPDX-FileCopyrightText: 2026 Warden Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Definition store that can be taken offline.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use warden_bus::EventBus;
use warden_core::{
    Definition, DefinitionStore, EventAction, PluginId, ReferenceType, WardenError,
};
use warden_storage::InMemoryDefinitionStore;

/// [`InMemoryDefinitionStore`] whose reads fail while offline.
///
/// Writes always succeed and are announced on the bus, so tests can model a
/// store that goes away between an event and the fetch that follows it.
pub struct FlakyStore {
    inner: InMemoryDefinitionStore,
    offline: AtomicBool,
}

impl FlakyStore {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            inner: InMemoryDefinitionStore::with_bus(bus),
            offline: AtomicBool::new(false),
        }
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn put(&self, definition: Definition) -> EventAction {
        self.inner.put(definition)
    }

    pub fn delete(&self, id: &str) -> Option<Definition> {
        self.inner.delete(&PluginId::from(id))
    }

    fn check(&self) -> Result<(), WardenError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(WardenError::storage(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "definition store offline",
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl DefinitionStore for FlakyStore {
    async fn find_all(
        &self,
        reference_type: ReferenceType,
        reference_id: &str,
    ) -> Result<Vec<Definition>, WardenError> {
        self.check()?;
        self.inner.find_all(reference_type, reference_id).await
    }

    async fn find_by_id(&self, id: &PluginId) -> Result<Option<Definition>, WardenError> {
        self.check()?;
        self.inner.find_by_id(id).await
    }
}
