// SPDX-FileCopyrightText: 2026 Warden Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain-scoped plugin runtime.
//!
//! For every domain and plugin kind, a [`PluginRegistry`] keeps the live
//! providers built from persisted definitions, a [`RegistryLifecycle`] keeps
//! it in step with deploy/update/undeploy events, and the shared
//! [`ReadinessTracker`] records which plugins are built and which events are
//! still pending. The [`ExtensionManager`] ties the kinds of a domain together.

pub mod catalog;
pub mod lifecycle;
pub mod manager;
pub mod metrics;
pub mod readiness;
pub mod registry;
pub mod sequencer;

#[cfg(test)]
mod testing;

pub use catalog::{
    CatalogEntry, CatalogFactory, ConfiguredProvider, builtin_catalog, find_entry, search_catalog,
};
pub use lifecycle::{LoadState, RegistryLifecycle};
pub use manager::{DomainExtensions, ExtensionManager, ExtensionManagerBuilder, ManagedRegistry};
pub use readiness::{DomainState, PluginStatus, ReadinessTracker};
pub use registry::{PluginRegistry, RegistryEntry, UpsertOutcome};
pub use sequencer::KeyedSequencer;
