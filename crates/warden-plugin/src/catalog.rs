// SPDX-FileCopyrightText: 2026 Warden Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Built-in plugin catalog.
//!
//! Lists the plugin types compiled into the Warden binary, per kind, with the
//! configuration keys each one requires. [`CatalogFactory`] turns definitions
//! of these types into [`ConfiguredProvider`]s.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;
use warden_core::{Definition, PluginId, PluginKind, Provider, ProviderFactory, WardenError};

/// One compiled-in plugin type.
#[derive(Debug, Clone, Serialize)]
pub struct CatalogEntry {
    /// Value of `Definition::plugin_type` selecting this implementation.
    pub plugin_type: String,
    pub kind: PluginKind,
    pub description: String,
    /// Keys that must be present in the definition's configuration.
    pub config_keys: Vec<String>,
}

fn entry(plugin_type: &str, kind: PluginKind, description: &str, keys: &[&str]) -> CatalogEntry {
    CatalogEntry {
        plugin_type: plugin_type.to_string(),
        kind,
        description: description.to_string(),
        config_keys: keys.iter().map(|k| k.to_string()).collect(),
    }
}

/// Returns all built-in plugin types.
pub fn builtin_catalog() -> Vec<CatalogEntry> {
    vec![
        entry(
            "inline-idp",
            PluginKind::IdentityProvider,
            "Users declared inline in the definition",
            &["users"],
        ),
        entry(
            "ldap-idp",
            PluginKind::IdentityProvider,
            "LDAP / Active Directory identity provider",
            &["context_source_url", "user_search_base"],
        ),
        entry(
            "http-idp",
            PluginKind::IdentityProvider,
            "Delegates authentication to an HTTP endpoint",
            &["authentication_url"],
        ),
        entry(
            "fingerprintjs-v3-community",
            PluginKind::DeviceIdentifier,
            "Browser fingerprint device identifier",
            &[],
        ),
        entry(
            "scope",
            PluginKind::Scope,
            "OAuth2 scope exposed to applications",
            &["key"],
        ),
    ]
}

/// Search the built-in catalog by query string.
///
/// Filters entries whose type, kind, or description contains the query
/// (case-insensitive). An empty query returns every entry.
pub fn search_catalog(query: &str) -> Vec<CatalogEntry> {
    if query.is_empty() {
        return builtin_catalog();
    }
    let query_lower = query.to_lowercase();
    builtin_catalog()
        .into_iter()
        .filter(|e| {
            e.plugin_type.to_lowercase().contains(&query_lower)
                || e.kind.to_string().to_lowercase().contains(&query_lower)
                || e.description.to_lowercase().contains(&query_lower)
        })
        .collect()
}

/// Looks up a plugin type within a kind.
pub fn find_entry(kind: PluginKind, plugin_type: &str) -> Option<CatalogEntry> {
    builtin_catalog()
        .into_iter()
        .find(|e| e.kind == kind && e.plugin_type == plugin_type)
}

/// A provider built from a catalog type and a validated configuration.
#[derive(Debug)]
pub struct ConfiguredProvider {
    pub id: PluginId,
    pub kind: PluginKind,
    pub plugin_type: String,
    pub name: String,
    pub configuration: serde_json::Value,
    stopped: AtomicBool,
}

impl ConfiguredProvider {
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Provider for ConfiguredProvider {
    async fn stop(&self) -> Result<(), WardenError> {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return Err(WardenError::provider(
                self.kind,
                format!("provider {} already stopped", self.id),
            ));
        }
        debug!(plugin = %self.id, plugin_type = %self.plugin_type, "provider stopped");
        Ok(())
    }
}

/// Factory for one kind backed by [`builtin_catalog`].
#[derive(Debug, Clone, Copy)]
pub struct CatalogFactory {
    kind: PluginKind,
}

impl CatalogFactory {
    pub fn new(kind: PluginKind) -> Self {
        Self { kind }
    }
}

#[async_trait]
impl ProviderFactory for CatalogFactory {
    type Provider = ConfiguredProvider;

    fn kind(&self) -> PluginKind {
        self.kind
    }

    async fn create(&self, definition: &Definition) -> Result<Arc<ConfiguredProvider>, WardenError> {
        let entry = find_entry(self.kind, &definition.plugin_type).ok_or_else(|| {
            WardenError::provider(
                self.kind,
                format!("unknown plugin type '{}'", definition.plugin_type),
            )
        })?;

        let missing: Vec<&str> = entry
            .config_keys
            .iter()
            .filter(|key| {
                definition
                    .configuration
                    .get(key.as_str())
                    .is_none_or(|value| value.is_null())
            })
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            return Err(WardenError::provider(
                self.kind,
                format!(
                    "{} is missing required configuration: {}",
                    definition.plugin_type,
                    missing.join(", ")
                ),
            ));
        }

        Ok(Arc::new(ConfiguredProvider {
            id: definition.id.clone(),
            kind: self.kind,
            plugin_type: definition.plugin_type.clone(),
            name: definition.name.clone(),
            configuration: definition.configuration.clone(),
            stopped: AtomicBool::new(false),
        }))
    }
}
