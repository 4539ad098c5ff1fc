// SPDX-FileCopyrightText: 2026 Warden Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./warden.toml` > `~/.config/warden/warden.toml` > `/etc/warden/warden.toml`
//! with environment variable overrides via `WARDEN_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::WardenConfig;

/// System-wide configuration file.
pub const SYSTEM_CONFIG_PATH: &str = "/etc/warden/warden.toml";

/// Configuration file in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "warden.toml";

/// Top-level sections, used to map `WARDEN_<SECTION>_<KEY>` variables.
const SECTIONS: &[&str] = &["log", "registry", "definitions", "gateway", "prometheus"];

/// `~/.config/warden/warden.toml`, when a config directory exists.
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("warden").join(LOCAL_CONFIG_FILE))
}

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/warden/warden.toml`
/// 3. `~/.config/warden/warden.toml`
/// 4. `./warden.toml`
/// 5. `WARDEN_*` environment variables
pub fn load_config() -> Result<WardenConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no files, no environment).
pub fn load_config_from_str(toml_content: &str) -> Result<WardenConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(WardenConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<WardenConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(WardenConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// The Figment behind [`load_config`], before extraction.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(WardenConfig::default()))
        .merge(Toml::file(SYSTEM_CONFIG_PATH))
        .merge(Toml::file(user_config_path().unwrap_or_default()))
        .merge(Toml::file(LOCAL_CONFIG_FILE))
        .merge(env_provider())
}

/// Create the environment variable provider.
///
/// Only the section prefix is turned into a dot, so
/// `WARDEN_REGISTRY_STARTUP_POLICY` maps to `registry.startup_policy` rather
/// than `registry.startup.policy`.
pub fn env_provider() -> Env {
    Env::prefixed("WARDEN_").map(|key| map_env_key(&key.as_str().to_ascii_lowercase()).into())
}

/// Map a lowercase, prefix-stripped variable name to a dotted config key.
pub fn map_env_key(key: &str) -> String {
    for section in SECTIONS {
        if let Some(rest) = key
            .strip_prefix(section)
            .and_then(|rest| rest.strip_prefix('_'))
        {
            return format!("{section}.{rest}");
        }
    }
    key.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_keys_split_on_section_only() {
        assert_eq!(map_env_key("registry_startup_policy"), "registry.startup_policy");
        assert_eq!(map_env_key("definitions_debounce_ms"), "definitions.debounce_ms");
        assert_eq!(map_env_key("log_level"), "log.level");
        assert_eq!(map_env_key("gateway_port"), "gateway.port");
        assert_eq!(map_env_key("unrelated"), "unrelated");
    }
}
