// SPDX-FileCopyrightText: 2026 Warden Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the Warden configuration system.

use figment::Figment;
use figment::providers::{Format, Serialized, Toml};
use serial_test::serial;
use warden_config::diagnostic::ConfigError;
use warden_config::model::{LogFormat, WardenConfig};
use warden_config::{load_and_validate_path, load_and_validate_str, load_config_from_str};
use warden_core::StartupPolicy;

/// A complete file deserializes into every section.
#[test]
fn valid_toml_deserializes_into_warden_config() {
    let toml = r#"
[log]
level = "debug"
format = "json"

[registry]
startup_policy = "non-blocking"
domains = ["d1", "d2"]

[definitions]
path = "/var/lib/warden/definitions"
watch = false
debounce_ms = 250

[gateway]
enabled = true
host = "0.0.0.0"
port = 9000

[prometheus]
enabled = true
"#;

    let config = load_config_from_str(toml).expect("valid TOML should deserialize");
    assert_eq!(config.log.level, "debug");
    assert_eq!(config.log.format, LogFormat::Json);
    assert_eq!(config.registry.startup_policy, StartupPolicy::NonBlocking);
    assert_eq!(config.registry.domains, vec!["d1", "d2"]);
    assert_eq!(
        config.definitions.path.to_str(),
        Some("/var/lib/warden/definitions")
    );
    assert!(!config.definitions.watch);
    assert_eq!(config.definitions.debounce_ms, 250);
    assert_eq!(config.gateway.host, "0.0.0.0");
    assert_eq!(config.gateway.port, 9000);
    assert!(config.prometheus.enabled);
}

/// An empty file yields the compiled defaults.
#[test]
fn empty_toml_uses_defaults() {
    let config = load_and_validate_str("").expect("defaults should validate");
    assert_eq!(config.log.level, "info");
    assert_eq!(config.log.format, LogFormat::Pretty);
    assert_eq!(config.registry.startup_policy, StartupPolicy::Blocking);
    assert!(config.registry.domains.is_empty());
    assert_eq!(config.definitions.path.to_str(), Some("definitions"));
    assert!(config.definitions.watch);
    assert_eq!(config.definitions.debounce_ms, 500);
    assert!(config.gateway.enabled);
    assert_eq!(config.gateway.port, 8092);
    assert!(!config.prometheus.enabled);
}

/// Unknown keys are reported with a suggestion.
#[test]
fn unknown_key_is_reported_with_suggestion() {
    let toml = r#"
[registry]
startup_polcy = "blocking"
"#;

    let errors = load_and_validate_str(toml).expect_err("should reject unknown key");
    assert_eq!(errors.len(), 1);
    match &errors[0] {
        ConfigError::UnknownKey {
            key, suggestion, ..
        } => {
            assert_eq!(key, "startup_polcy");
            assert_eq!(suggestion.as_deref(), Some("startup_policy"));
        }
        other => panic!("expected UnknownKey, got {other:?}"),
    }
}

/// An unknown top-level section is rejected.
#[test]
fn unknown_section_is_rejected() {
    let toml = r#"
[gatway]
port = 1
"#;

    let errors = load_and_validate_str(toml).expect_err("should reject unknown section");
    assert!(matches!(&errors[0], ConfigError::UnknownKey { key, .. } if key == "gatway"));
}

/// A startup policy outside the known variants is rejected.
#[test]
fn invalid_startup_policy_is_rejected() {
    let toml = r#"
[registry]
startup_policy = "eventually"
"#;

    let errors = load_and_validate_str(toml).expect_err("should reject policy");
    assert!(
        matches!(&errors[0], ConfigError::InvalidValue { value, .. } if value == "eventually"),
        "got {errors:?}"
    );
}

/// A value of the wrong type is rejected.
#[test]
fn wrong_type_is_rejected() {
    let toml = r#"
[gateway]
port = "eighty"
"#;

    let errors = load_and_validate_str(toml).expect_err("should reject type");
    assert!(
        matches!(&errors[0], ConfigError::InvalidType { .. }),
        "got {errors:?}"
    );
}

/// Semantic validation runs after deserialization.
#[test]
fn semantic_errors_are_collected() {
    let toml = r#"
[log]
level = "chatty"

[registry]
domains = ["d1", "d1"]
"#;

    let errors = load_and_validate_str(toml).expect_err("should fail validation");
    assert_eq!(errors.len(), 2);
    assert!(
        errors
            .iter()
            .all(|e| matches!(e, ConfigError::Validation { .. }))
    );
}

/// Later providers override earlier ones, the way env vars override files.
#[test]
fn later_layers_override_file_values() {
    let config: WardenConfig = Figment::new()
        .merge(Serialized::defaults(WardenConfig::default()))
        .merge(Toml::string("[gateway]\nport = 9000\n"))
        .merge(("gateway.port", 9100))
        .merge(("registry.startup_policy", "non-blocking"))
        .extract()
        .expect("layered config should extract");

    assert_eq!(config.gateway.port, 9100);
    assert_eq!(config.registry.startup_policy, StartupPolicy::NonBlocking);
}

/// `WARDEN_*` variables override a config file, including multi-word keys.
#[test]
#[serial]
fn env_vars_override_config_file() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("warden.toml");
    std::fs::write(
        &path,
        "[registry]\nstartup_policy = \"blocking\"\n\n[definitions]\ndebounce_ms = 250\n",
    )
    .unwrap();

    // SAFETY: test-only env mutation, serialized with the other env tests.
    unsafe {
        std::env::set_var("WARDEN_REGISTRY_STARTUP_POLICY", "non-blocking");
        std::env::set_var("WARDEN_DEFINITIONS_DEBOUNCE_MS", "750");
    }

    let result = load_and_validate_path(&path);

    // SAFETY: test-only env mutation, serialized with the other env tests.
    unsafe {
        std::env::remove_var("WARDEN_REGISTRY_STARTUP_POLICY");
        std::env::remove_var("WARDEN_DEFINITIONS_DEBOUNCE_MS");
    }

    let config = result.expect("config should load");
    assert_eq!(config.registry.startup_policy, StartupPolicy::NonBlocking);
    assert_eq!(config.definitions.debounce_ms, 750);
}

/// Unknown keys in a file are reported with a suggestion.
#[test]
#[serial]
fn file_errors_suggest_known_key() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("warden.toml");
    std::fs::write(&path, "[definitions]\nwach = true\n").unwrap();

    let errors = load_and_validate_path(&path).expect_err("should reject unknown key");
    match &errors[0] {
        ConfigError::UnknownKey {
            key, suggestion, ..
        } => {
            assert_eq!(key, "wach");
            assert_eq!(suggestion.as_deref(), Some("watch"));
        }
        other => panic!("expected UnknownKey, got {other:?}"),
    }
}
