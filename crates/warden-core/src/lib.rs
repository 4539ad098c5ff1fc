// SPDX-FileCopyrightText: 2026 Warden Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Warden plugin runtime.
//!
//! This crate provides the error type, identifiers, definition and event
//! types, and the trait seams (`Provider`, `ProviderFactory`,
//! `DefinitionStore`) that every other Warden crate builds on.

pub mod error;
pub mod traits;
pub mod types;

pub use error::WardenError;
pub use traits::{DefinitionStore, Provider, ProviderFactory};
pub use types::{
    Definition, DomainId, DomainStatus, EventAction, EventPayload, PluginEvent, PluginId,
    PluginKind, ReferenceType, StartupPolicy,
};

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use chrono::{Duration, Utc};

    use super::*;

    #[test]
    fn plugin_kind_uses_event_class_names() {
        assert_eq!(PluginKind::Scope.to_string(), "SCOPE");
        assert_eq!(
            PluginKind::from_str("IDENTITY_PROVIDER").unwrap(),
            PluginKind::IdentityProvider
        );
        let json = serde_json::to_string(&PluginKind::DeviceIdentifier).unwrap();
        assert_eq!(json, "\"DEVICE_IDENTIFIER\"");
    }

    #[test]
    fn startup_policy_defaults_to_blocking() {
        assert_eq!(StartupPolicy::default(), StartupPolicy::Blocking);
        let parsed: StartupPolicy = serde_json::from_str("\"non-blocking\"").unwrap();
        assert_eq!(parsed, StartupPolicy::NonBlocking);
    }

    #[test]
    fn newer_definition_supersedes_older() {
        let now = Utc::now();
        let old = Definition::new("idp", PluginKind::IdentityProvider, "d1", "inline-idp", now);
        let newer = Definition::new(
            "idp",
            PluginKind::IdentityProvider,
            "d1",
            "inline-idp",
            now + Duration::seconds(1),
        );
        assert!(newer.supersedes(&old));
        assert!(!old.supersedes(&newer));
        assert!(!old.supersedes(&old.clone()));
    }

    #[test]
    fn event_targets_only_its_domain() {
        let def = Definition::new("s1", PluginKind::Scope, "d1", "scope", Utc::now());
        let event = PluginEvent::new(PluginKind::Scope, EventAction::Deploy, def.payload());
        assert!(event.targets_domain(&DomainId::from("d1")));
        assert!(!event.targets_domain(&DomainId::from("d2")));

        let mut org_event = event.clone();
        org_event.payload.reference_type = ReferenceType::Organization;
        assert!(!org_event.targets_domain(&DomainId::from("d1")));
    }

    #[test]
    fn ids_serialize_transparently() {
        let id = PluginId::from("ldap-main");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"ldap-main\"");
        assert_eq!(id.to_string(), "ldap-main");
    }

    #[test]
    fn provider_error_names_kind() {
        let err = WardenError::provider(PluginKind::Scope, "missing key");
        assert_eq!(err.to_string(), "SCOPE provider error: missing key");
    }
}
