// SPDX-FileCopyrightText: 2026 Warden Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `warden catalog` command implementation.

use warden_core::{PluginKind, WardenError};
use warden_plugin::{CatalogEntry, builtin_catalog, search_catalog};

/// Catalog entries matching the optional kind and search filters.
pub fn select_entries(kind: Option<PluginKind>, query: Option<&str>) -> Vec<CatalogEntry> {
    let entries = match query {
        Some(query) => search_catalog(query),
        None => builtin_catalog(),
    };
    entries
        .into_iter()
        .filter(|entry| kind.is_none_or(|kind| entry.kind == kind))
        .collect()
}

/// Run the `warden catalog` command.
pub fn run_catalog(
    kind: Option<PluginKind>,
    query: Option<&str>,
    json: bool,
) -> Result<(), WardenError> {
    let entries = select_entries(kind, query);

    if json {
        let rendered = serde_json::to_string_pretty(&entries)
            .map_err(|e| WardenError::Internal(format!("failed to render catalog: {e}")))?;
        println!("{rendered}");
        return Ok(());
    }

    if entries.is_empty() {
        println!("no matching plugin types");
        return Ok(());
    }

    let width = entries
        .iter()
        .map(|entry| entry.plugin_type.len())
        .max()
        .unwrap_or_default();
    for entry in &entries {
        let keys = if entry.config_keys.is_empty() {
            "-".to_string()
        } else {
            entry.config_keys.join(", ")
        };
        println!(
            "{:<width$}  {:<18}  {}  [requires: {keys}]",
            entry.plugin_type,
            entry.kind.to_string(),
            entry.description,
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filters_by_kind() {
        let entries = select_entries(Some(PluginKind::IdentityProvider), None);
        assert!(!entries.is_empty());
        assert!(
            entries
                .iter()
                .all(|entry| entry.kind == PluginKind::IdentityProvider)
        );
    }

    #[test]
    fn search_and_kind_combine() {
        let entries = select_entries(Some(PluginKind::Scope), Some("ldap"));
        assert!(entries.is_empty());

        let entries = select_entries(None, Some("ldap"));
        assert!(entries.iter().any(|entry| entry.plugin_type == "ldap-idp"));
    }
}
