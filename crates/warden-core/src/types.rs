// SPDX-FileCopyrightText: 2026 Warden Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared by the registry, the event bus, and definition stores.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Identifier of a domain (tenant / security realm).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DomainId(pub String);

/// Identifier of a plugin instance (one persisted definition).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PluginId(pub String);

impl DomainId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl PluginId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DomainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for PluginId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DomainId {
    fn from(value: &str) -> Self {
        DomainId(value.to_string())
    }
}

impl From<String> for DomainId {
    fn from(value: String) -> Self {
        DomainId(value)
    }
}

impl From<&str> for PluginId {
    fn from(value: &str) -> Self {
        PluginId(value.to_string())
    }
}

impl From<String> for PluginId {
    fn from(value: String) -> Self {
        PluginId(value)
    }
}

/// Category of pluggable extension. Each kind has exactly one provider factory
/// and doubles as the event class on the bus.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum PluginKind {
    IdentityProvider,
    DeviceIdentifier,
    Scope,
}

impl PluginKind {
    /// All kinds, in a stable order.
    pub const ALL: [PluginKind; 3] = [
        PluginKind::IdentityProvider,
        PluginKind::DeviceIdentifier,
        PluginKind::Scope,
    ];
}

/// What a definition (or event) is attached to.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ReferenceType {
    Domain,
    Organization,
}

/// Action carried by a bus notification.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum EventAction {
    Deploy,
    Update,
    Undeploy,
}

/// Coarse-grained lifecycle status of a domain.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum DomainStatus {
    Initializing,
    Deployed,
    Removing,
    Error,
}

/// Whether a domain is declared ready before or after its initial bulk load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StartupPolicy {
    /// `start` returns once every definition has been loaded.
    #[default]
    Blocking,
    /// `start` returns immediately; the bulk load runs in the background.
    NonBlocking,
}

/// Persisted, declarative configuration of one plugin instance.
///
/// Definitions are immutable once read. A definition with a newer
/// `updated_at` supersedes an older one with the same id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Definition {
    pub id: PluginId,
    pub kind: PluginKind,
    pub domain_id: DomainId,
    pub reference_type: ReferenceType,
    pub name: String,
    /// Implementation inside the kind, e.g. `ldap-idp`.
    pub plugin_type: String,
    /// Opaque configuration handed to the provider factory.
    pub configuration: serde_json::Value,
    pub updated_at: DateTime<Utc>,
}

impl Definition {
    /// Builds a domain-scoped definition with an empty configuration.
    pub fn new(
        id: impl Into<PluginId>,
        kind: PluginKind,
        domain_id: impl Into<DomainId>,
        plugin_type: impl Into<String>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        let id = id.into();
        Self {
            name: id.0.clone(),
            id,
            kind,
            domain_id: domain_id.into(),
            reference_type: ReferenceType::Domain,
            plugin_type: plugin_type.into(),
            configuration: serde_json::Value::Object(serde_json::Map::new()),
            updated_at,
        }
    }

    /// Replaces the configuration.
    pub fn with_configuration(mut self, configuration: serde_json::Value) -> Self {
        self.configuration = configuration;
        self
    }

    /// Replaces the display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Returns true when `self` should replace `current`.
    pub fn supersedes(&self, current: &Definition) -> bool {
        self.updated_at > current.updated_at
    }

    /// The bus payload addressing this definition.
    pub fn payload(&self) -> EventPayload {
        EventPayload {
            id: self.id.clone(),
            reference_type: self.reference_type,
            reference_id: self.domain_id.0.clone(),
        }
    }
}

/// Body of a bus notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventPayload {
    pub id: PluginId,
    pub reference_type: ReferenceType,
    pub reference_id: String,
}

/// A deploy/update/undeploy notification for one plugin instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginEvent {
    /// Event class; subscribers register per class and domain.
    pub class: PluginKind,
    pub action: EventAction,
    pub payload: EventPayload,
}

impl PluginEvent {
    pub fn new(class: PluginKind, action: EventAction, payload: EventPayload) -> Self {
        Self {
            class,
            action,
            payload,
        }
    }

    /// Returns true when the event targets the given domain.
    pub fn targets_domain(&self, domain: &DomainId) -> bool {
        self.payload.reference_type == ReferenceType::Domain
            && self.payload.reference_id == domain.0
    }
}
