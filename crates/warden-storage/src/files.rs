// SPDX-FileCopyrightText: 2026 Warden Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Definition store backed by a directory of TOML files.
//!
//! Layout: `<root>/<domain>/<anything>.toml`, one definition per file:
//!
//! ```toml
//! [definition]
//! id = "corp-ldap"
//! kind = "IDENTITY_PROVIDER"
//! name = "Corporate LDAP"
//! type = "ldap-idp"
//! updated_at = "2026-03-01T12:00:00Z"   # optional, defaults to file mtime
//!
//! [definition.configuration]
//! context_source_url = "ldap://ldap.example.com:389"
//! ```
//!
//! The parsed tree is held as an immutable snapshot; [`FileDefinitionStore::rescan`]
//! swaps in a fresh one and reports what changed as bus events. A file that
//! fails to parse but still names its id stays in the snapshot as unreadable.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use arc_swap::ArcSwap;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, info, warn};
use warden_core::{
    Definition, DefinitionStore, DomainId, EventAction, EventPayload, PluginEvent, PluginId,
    PluginKind, ReferenceType, WardenError,
};

/// File extension of definition files.
pub const DEFINITION_EXTENSION: &str = "toml";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DefinitionFile {
    definition: DefinitionSection,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DefinitionSection {
    id: String,
    kind: PluginKind,
    name: Option<String>,
    #[serde(rename = "type")]
    plugin_type: String,
    updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    configuration: toml::Table,
}

/// Parse one definition file's content for `domain`.
///
/// `fallback_updated_at` is used when the file has no `updated_at`.
pub fn parse_definition(
    domain: &DomainId,
    content: &str,
    fallback_updated_at: DateTime<Utc>,
) -> Result<Definition, WardenError> {
    let file: DefinitionFile = toml::from_str(content)
        .map_err(|e| WardenError::Config(format!("invalid definition file: {e}")))?;
    let section = file.definition;

    if section.id.trim().is_empty() {
        return Err(WardenError::Config(
            "definition: id must not be empty".to_string(),
        ));
    }
    if section.plugin_type.trim().is_empty() {
        return Err(WardenError::Config(
            "definition: type must not be empty".to_string(),
        ));
    }

    let configuration = serde_json::to_value(&section.configuration).map_err(|e| {
        WardenError::Config(format!(
            "definition {}: unsupported configuration value: {e}",
            section.id
        ))
    })?;

    let definition = Definition::new(
        section.id.as_str(),
        section.kind,
        domain.clone(),
        section.plugin_type,
        section.updated_at.unwrap_or(fallback_updated_at),
    )
    .with_configuration(configuration);

    Ok(match section.name {
        Some(name) => definition.with_name(name),
        None => definition,
    })
}

/// A definition file that exists but no longer parses.
///
/// Kept in the snapshot so lookups for its id fail instead of reporting the
/// definition as gone.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Unreadable {
    domain: DomainId,
    kind: Option<PluginKind>,
    path: PathBuf,
    reason: String,
}

impl Unreadable {
    fn payload(&self, id: &PluginId) -> EventPayload {
        EventPayload {
            id: id.clone(),
            reference_type: ReferenceType::Domain,
            reference_id: self.domain.as_str().to_string(),
        }
    }
}

#[derive(Debug, Default)]
struct Snapshot {
    definitions: HashMap<PluginId, Definition>,
    unreadable: HashMap<PluginId, Unreadable>,
    // Id each file held on its last read.
    files: HashMap<PathBuf, PluginId>,
}

impl Snapshot {
    fn kind_of(&self, id: &PluginId) -> Option<PluginKind> {
        self.definitions
            .get(id)
            .map(|d| d.kind)
            .or_else(|| self.unreadable.get(id).and_then(|u| u.kind))
    }
}

/// Read-only store over `<root>/<domain>/*.toml`.
pub struct FileDefinitionStore {
    root: PathBuf,
    snapshot: ArcSwap<Snapshot>,
    rescanning: Mutex<()>,
}

impl std::fmt::Debug for FileDefinitionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let snapshot = self.snapshot.load();
        f.debug_struct("FileDefinitionStore")
            .field("root", &self.root)
            .field("definitions", &snapshot.definitions.len())
            .field("unreadable", &snapshot.unreadable.len())
            .finish()
    }
}

impl FileDefinitionStore {
    /// Open the store and read the initial snapshot.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, WardenError> {
        let root = root.into();
        let snapshot = scan(&root, &Snapshot::default())?;
        info!(
            root = %root.display(),
            count = snapshot.definitions.len(),
            unreadable = snapshot.unreadable.len(),
            "definition directory loaded"
        );
        Ok(Self {
            root,
            snapshot: ArcSwap::from_pointee(snapshot),
            rescanning: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Domains present in the current snapshot, sorted.
    pub fn domains(&self) -> Vec<DomainId> {
        let mut domains: Vec<DomainId> = self
            .snapshot
            .load()
            .definitions
            .values()
            .map(|d| d.domain_id.clone())
            .collect();
        domains.sort();
        domains.dedup();
        domains
    }

    /// Subdirectories of the root, i.e. every domain that may hold
    /// definitions, sorted.
    pub fn domain_directories(&self) -> Result<Vec<DomainId>, WardenError> {
        let mut domains = Vec::new();
        for entry in fs::read_dir(&self.root).map_err(WardenError::storage)? {
            let entry = entry.map_err(WardenError::storage)?;
            if !entry.file_type().map_err(WardenError::storage)?.is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                domains.push(DomainId::from(name));
            }
        }
        domains.sort();
        Ok(domains)
    }

    /// Number of readable definitions.
    pub fn len(&self) -> usize {
        self.snapshot.load().definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot.load().definitions.is_empty()
    }

    /// Re-read the directory, swap in the new snapshot, and return the
    /// deploy/update/undeploy events describing the difference.
    ///
    /// The snapshot is replaced before the events are returned, so readers
    /// reacting to an event already see the new definitions. A file that
    /// stops parsing keeps its id in the snapshot: it is announced as an
    /// update and [`DefinitionStore::find_by_id`] fails for it until the
    /// file is fixed or removed.
    pub fn rescan(&self) -> Result<Vec<PluginEvent>, WardenError> {
        let _serial = self
            .rescanning
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let previous = self.snapshot.load_full();
        let fresh = scan(&self.root, &previous)?;
        self.snapshot.store(Arc::new(fresh));
        let current = self.snapshot.load();
        let events = diff(&previous, &current);
        if !events.is_empty() {
            info!(root = %self.root.display(), changes = events.len(), "definition directory changed");
        }
        Ok(events)
    }
}

#[async_trait]
impl DefinitionStore for FileDefinitionStore {
    async fn find_all(
        &self,
        reference_type: ReferenceType,
        reference_id: &str,
    ) -> Result<Vec<Definition>, WardenError> {
        let snapshot = self.snapshot.load();
        let mut found: Vec<Definition> = snapshot
            .definitions
            .values()
            .filter(|d| d.reference_type == reference_type && d.domain_id.as_str() == reference_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(found)
    }

    async fn find_by_id(&self, id: &PluginId) -> Result<Option<Definition>, WardenError> {
        let snapshot = self.snapshot.load();
        if let Some(unreadable) = snapshot.unreadable.get(id) {
            return Err(WardenError::Config(format!(
                "definition {id} in {} cannot be read: {}",
                unreadable.path.display(),
                unreadable.reason
            )));
        }
        Ok(snapshot.definitions.get(id).cloned())
    }
}

// Files whose id can be recovered stay in the snapshot as unreadable; other
// invalid files are logged and skipped. Only an unreadable root fails.
fn scan(root: &Path, previous: &Snapshot) -> Result<Snapshot, WardenError> {
    let mut files: BTreeMap<PathBuf, DomainId> = BTreeMap::new();
    for domain_dir in fs::read_dir(root).map_err(WardenError::storage)? {
        let domain_dir = domain_dir.map_err(WardenError::storage)?;
        let path = domain_dir.path();
        if !path.is_dir() {
            continue;
        }
        let Some(domain) = path.file_name().and_then(|n| n.to_str()).map(DomainId::from) else {
            warn!(path = %path.display(), "skipping domain directory with a non UTF-8 name");
            continue;
        };
        let entries = match fs::read_dir(&path) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot read domain directory");
                continue;
            }
        };
        for entry in entries.flatten() {
            let file = entry.path();
            if file.is_file()
                && file.extension().and_then(|e| e.to_str()) == Some(DEFINITION_EXTENSION)
            {
                files.insert(file, domain.clone());
            }
        }
    }

    let mut snapshot = Snapshot::default();
    for (path, domain) in files {
        let content = fs::read_to_string(&path);
        let parsed = match &content {
            Ok(content) => {
                parse_definition(&domain, content, modified_at(&path)).map_err(|e| e.to_string())
            }
            Err(e) => Err(e.to_string()),
        };
        match parsed {
            Ok(definition) => {
                if let Some(existing) = snapshot.definitions.get(&definition.id) {
                    warn!(
                        path = %path.display(),
                        plugin = %definition.id,
                        domain = %existing.domain_id,
                        "duplicate plugin id, keeping the first definition"
                    );
                    continue;
                }
                debug!(path = %path.display(), plugin = %definition.id, "definition read");
                snapshot.files.insert(path, definition.id.clone());
                snapshot.definitions.insert(definition.id.clone(), definition);
            }
            Err(e) => {
                let (id, kind) = recover_identity(content.as_deref().ok());
                let Some(id) = id.or_else(|| previous.files.get(&path).cloned()) else {
                    warn!(path = %path.display(), error = %e, "skipping invalid definition file");
                    continue;
                };
                warn!(path = %path.display(), plugin = %id, error = %e, "definition file cannot be read");
                let kind = kind.or_else(|| previous.kind_of(&id));
                snapshot.files.insert(path.clone(), id.clone());
                snapshot.unreadable.entry(id).or_insert(Unreadable {
                    domain,
                    kind,
                    path,
                    reason: e,
                });
            }
        }
    }
    // A readable file wins over an unreadable one claiming the same id.
    snapshot
        .unreadable
        .retain(|id, _| !snapshot.definitions.contains_key(id));
    Ok(snapshot)
}

// Best-effort id and kind of a file that fails strict parsing.
fn recover_identity(content: Option<&str>) -> (Option<PluginId>, Option<PluginKind>) {
    let Some(table) = content.and_then(|c| c.parse::<toml::Table>().ok()) else {
        return (None, None);
    };
    let Some(section) = table.get("definition").and_then(|d| d.as_table()) else {
        return (None, None);
    };
    let id = section
        .get("id")
        .and_then(|v| v.as_str())
        .filter(|id| !id.trim().is_empty())
        .map(PluginId::from);
    let kind = section
        .get("kind")
        .and_then(|v| v.as_str())
        .and_then(|k| k.parse::<PluginKind>().ok());
    (id, kind)
}

fn modified_at(path: &Path) -> DateTime<Utc> {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| Utc::now())
}

fn diff(previous: &Snapshot, current: &Snapshot) -> Vec<PluginEvent> {
    let mut events = Vec::new();

    for (id, old) in &previous.definitions {
        if let Some(new) = current.definitions.get(id) {
            if new.domain_id != old.domain_id || new.kind != old.kind {
                // Moved: retire it where it was, deploy it where it is.
                events.push(PluginEvent::new(old.kind, EventAction::Undeploy, old.payload()));
                events.push(PluginEvent::new(new.kind, EventAction::Deploy, new.payload()));
            } else if new != old {
                events.push(PluginEvent::new(new.kind, EventAction::Update, new.payload()));
            }
        } else if let Some(broken) = current.unreadable.get(id) {
            if broken.domain == old.domain_id && broken.kind.is_none_or(|k| k == old.kind) {
                // Re-fetching fails, which marks the plugin failed in place.
                events.push(PluginEvent::new(old.kind, EventAction::Update, old.payload()));
            } else {
                events.push(PluginEvent::new(old.kind, EventAction::Undeploy, old.payload()));
                if let Some(kind) = broken.kind {
                    events.push(PluginEvent::new(kind, EventAction::Deploy, broken.payload(id)));
                }
            }
        } else {
            events.push(PluginEvent::new(old.kind, EventAction::Undeploy, old.payload()));
        }
    }

    for (id, old) in &previous.unreadable {
        let moved_to = current
            .definitions
            .get(id)
            .map(|d| (d.domain_id.clone(), Some(d.kind)))
            .or_else(|| current.unreadable.get(id).map(|u| (u.domain.clone(), u.kind)));
        let stays = moved_to
            .as_ref()
            .is_some_and(|(domain, kind)| *domain == old.domain && *kind == old.kind);
        if !stays {
            if let Some(kind) = old.kind {
                events.push(PluginEvent::new(kind, EventAction::Undeploy, old.payload(id)));
            }
        }
        if let Some(new) = current.definitions.get(id) {
            let action = if stays {
                EventAction::Update
            } else {
                EventAction::Deploy
            };
            events.push(PluginEvent::new(new.kind, action, new.payload()));
        } else if let Some(broken) = current.unreadable.get(id) {
            let action = match (stays, broken.reason == old.reason) {
                (false, _) => Some(EventAction::Deploy),
                (true, false) => Some(EventAction::Update),
                (true, true) => None,
            };
            if let (Some(action), Some(kind)) = (action, broken.kind) {
                events.push(PluginEvent::new(kind, action, broken.payload(id)));
            }
        }
    }

    for (id, new) in &current.definitions {
        if !previous.definitions.contains_key(id) && !previous.unreadable.contains_key(id) {
            events.push(PluginEvent::new(new.kind, EventAction::Deploy, new.payload()));
        }
    }
    for (id, broken) in &current.unreadable {
        if previous.definitions.contains_key(id) || previous.unreadable.contains_key(id) {
            continue;
        }
        if let Some(kind) = broken.kind {
            events.push(PluginEvent::new(kind, EventAction::Deploy, broken.payload(id)));
        }
    }

    events.sort_by(|a, b| a.payload.id.cmp(&b.payload.id));
    events
}
