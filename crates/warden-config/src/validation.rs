// SPDX-FileCopyrightText: 2026 Warden Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde attributes,
//! such as valid addresses, non-empty paths, and well-formed domain names.

use std::collections::HashSet;

use crate::diagnostic::ConfigError;
use crate::model::WardenConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Debounce bounds in milliseconds.
const MIN_DEBOUNCE_MS: u64 = 10;
const MAX_DEBOUNCE_MS: u64 = 60_000;

/// Validate a deserialized configuration for semantic correctness.
///
/// Collects every failure instead of stopping at the first.
pub fn validate_config(config: &WardenConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut fail = |message: String| errors.push(ConfigError::Validation { message });

    let level = config.log.level.trim().to_ascii_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        fail(format!(
            "log.level `{}` is not one of: {}",
            config.log.level,
            LOG_LEVELS.join(", ")
        ));
    }

    let mut seen = HashSet::new();
    for domain in &config.registry.domains {
        if domain.trim().is_empty() {
            fail("registry.domains must not contain empty names".to_string());
        } else if domain.contains(['/', '\\']) || domain == "." || domain == ".." {
            fail(format!(
                "registry.domains entry `{domain}` must be a plain directory name"
            ));
        } else if !seen.insert(domain.as_str()) {
            fail(format!("registry.domains lists `{domain}` more than once"));
        }
    }

    if config.definitions.path.as_os_str().is_empty() {
        fail("definitions.path must not be empty".to_string());
    }

    let debounce = config.definitions.debounce_ms;
    if !(MIN_DEBOUNCE_MS..=MAX_DEBOUNCE_MS).contains(&debounce) {
        fail(format!(
            "definitions.debounce_ms must be between {MIN_DEBOUNCE_MS} and {MAX_DEBOUNCE_MS}, got {debounce}"
        ));
    }

    if config.gateway.enabled {
        let host = config.gateway.host.trim();
        if host.is_empty() {
            fail("gateway.host must not be empty".to_string());
        } else {
            let is_valid_ip = host.parse::<std::net::IpAddr>().is_ok();
            let is_valid_hostname = host
                .chars()
                .all(|c| c.is_alphanumeric() || c == '.' || c == '-');
            if !is_valid_ip && !is_valid_hostname {
                fail(format!(
                    "gateway.host `{host}` is not a valid IP address or hostname"
                ));
            }
        }

        if config.gateway.port == 0 {
            fail("gateway.port must not be 0".to_string());
        }
    }

    if config.prometheus.enabled && !config.gateway.enabled {
        fail("prometheus.enabled requires gateway.enabled to serve /metrics".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn messages(config: &WardenConfig) -> Vec<String> {
        validate_config(config)
            .unwrap_err()
            .into_iter()
            .map(|e| e.to_string())
            .collect()
    }

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config(&WardenConfig::default()).is_ok());
    }

    #[test]
    fn all_errors_are_collected() {
        let mut config = WardenConfig::default();
        config.log.level = "loud".to_string();
        config.gateway.port = 0;
        config.definitions.debounce_ms = 0;

        let errors = messages(&config);
        assert_eq!(errors.len(), 3, "{errors:?}");
    }

    #[test]
    fn duplicate_and_malformed_domains_are_rejected() {
        let mut config = WardenConfig::default();
        config.registry.domains = vec![
            "d1".to_string(),
            "d1".to_string(),
            "".to_string(),
            "../etc".to_string(),
        ];

        let errors = messages(&config);
        assert_eq!(errors.len(), 3, "{errors:?}");
        assert!(errors.iter().any(|e| e.contains("more than once")));
        assert!(errors.iter().any(|e| e.contains("empty names")));
        assert!(errors.iter().any(|e| e.contains("plain directory name")));
    }

    #[test]
    fn gateway_checks_are_skipped_when_disabled() {
        let mut config = WardenConfig::default();
        config.gateway.enabled = false;
        config.gateway.port = 0;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn prometheus_needs_gateway() {
        let mut config = WardenConfig::default();
        config.gateway.enabled = false;
        config.prometheus.enabled = true;
        let errors = messages(&config);
        assert!(errors[0].contains("prometheus.enabled"));
    }
}
