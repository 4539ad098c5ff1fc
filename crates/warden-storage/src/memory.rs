// SPDX-FileCopyrightText: 2026 Warden Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory definition store.
//!
//! Administrative writes go through [`InMemoryDefinitionStore::put`] and
//! [`InMemoryDefinitionStore::delete`], which announce the change on the
//! attached event bus after the store is updated.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;
use warden_bus::EventBus;
use warden_core::{
    Definition, DefinitionStore, EventAction, PluginEvent, PluginId, ReferenceType, WardenError,
};

/// Definitions held in a concurrent map.
#[derive(Debug, Default)]
pub struct InMemoryDefinitionStore {
    definitions: DashMap<PluginId, Definition>,
    bus: Option<Arc<EventBus>>,
}

impl InMemoryDefinitionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish every write on `bus`.
    pub fn with_bus(bus: Arc<EventBus>) -> Self {
        Self {
            definitions: DashMap::new(),
            bus: Some(bus),
        }
    }

    /// Insert or replace a definition.
    ///
    /// Returns `Deploy` for a new id and `Update` for an existing one.
    pub fn put(&self, definition: Definition) -> EventAction {
        let payload = definition.payload();
        let kind = definition.kind;
        let previous = self.definitions.insert(definition.id.clone(), definition);

        let action = match previous {
            None => EventAction::Deploy,
            Some(_) => EventAction::Update,
        };
        debug!(plugin = %payload.id, %action, "definition stored");
        self.announce(PluginEvent::new(kind, action, payload));
        action
    }

    /// Delete a definition, returning it if it existed.
    pub fn delete(&self, id: &PluginId) -> Option<Definition> {
        let (_, removed) = self.definitions.remove(id)?;
        debug!(plugin = %id, "definition deleted");
        self.announce(PluginEvent::new(
            removed.kind,
            EventAction::Undeploy,
            removed.payload(),
        ));
        Some(removed)
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    fn announce(&self, event: PluginEvent) {
        if let Some(bus) = &self.bus {
            bus.publish(event);
        }
    }
}

#[async_trait]
impl DefinitionStore for InMemoryDefinitionStore {
    async fn find_all(
        &self,
        reference_type: ReferenceType,
        reference_id: &str,
    ) -> Result<Vec<Definition>, WardenError> {
        let mut found: Vec<Definition> = self
            .definitions
            .iter()
            .filter(|d| d.reference_type == reference_type && d.domain_id.as_str() == reference_id)
            .map(|d| d.value().clone())
            .collect();
        found.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(found)
    }

    async fn find_by_id(&self, id: &PluginId) -> Result<Option<Definition>, WardenError> {
        Ok(self.definitions.get(id).map(|d| d.value().clone()))
    }
}
