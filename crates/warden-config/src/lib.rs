// SPDX-FileCopyrightText: 2026 Warden Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration system for the Warden plugin runtime.
//!
//! Provides TOML configuration parsing with strict validation (`deny_unknown_fields`),
//! XDG file hierarchy lookup, environment variable overrides, and diagnostic
//! error rendering with typo suggestions.
//!
//! # Usage
//!
//! ```no_run
//! use warden_config::load_and_validate;
//!
//! let config = load_and_validate().expect("config errors");
//! println!("definitions: {}", config.definitions.path.display());
//! ```

pub mod diagnostic;
pub mod loader;
pub mod model;
pub mod validation;

use std::path::{Path, PathBuf};

pub use diagnostic::{ConfigError, render_errors};
pub use loader::{load_config, load_config_from_path, load_config_from_str};
pub use model::{LogFormat, WardenConfig};

/// Load configuration from the XDG hierarchy and validate it.
///
/// Returns either a valid `WardenConfig` or every diagnostic found.
pub fn load_and_validate() -> Result<WardenConfig, Vec<ConfigError>> {
    checked(loader::load_config(), collect_toml_sources)
}

/// Load configuration from a single file (plus env overrides) and validate it.
pub fn load_and_validate_path(path: &Path) -> Result<WardenConfig, Vec<ConfigError>> {
    checked(loader::load_config_from_path(path), || {
        read_sources([path.to_path_buf()])
    })
}

/// Load configuration from a TOML string and validate it.
pub fn load_and_validate_str(toml_content: &str) -> Result<WardenConfig, Vec<ConfigError>> {
    checked(loader::load_config_from_str(toml_content), || {
        vec![("<inline>".to_string(), toml_content.to_string())]
    })
}

// Sources are only read when extraction failed.
fn checked(
    loaded: Result<WardenConfig, figment::Error>,
    sources: impl FnOnce() -> Vec<(String, String)>,
) -> Result<WardenConfig, Vec<ConfigError>> {
    let config = loaded.map_err(|err| diagnostic::figment_to_config_errors(err, &sources()))?;
    validation::validate_config(&config)?;
    Ok(config)
}

/// Every config file figment may have read, for error span resolution.
fn collect_toml_sources() -> Vec<(String, String)> {
    let local = std::env::current_dir()
        .map(|dir| dir.join(loader::LOCAL_CONFIG_FILE))
        .unwrap_or_else(|_| PathBuf::from(loader::LOCAL_CONFIG_FILE));
    let candidates = [
        Some(local),
        loader::user_config_path(),
        Some(PathBuf::from(loader::SYSTEM_CONFIG_PATH)),
    ];
    read_sources(candidates.into_iter().flatten())
}

fn read_sources(paths: impl IntoIterator<Item = PathBuf>) -> Vec<(String, String)> {
    paths
        .into_iter()
        .filter_map(|path| {
            let content = std::fs::read_to_string(&path).ok()?;
            Some((path.display().to_string(), content))
        })
        .collect()
}
