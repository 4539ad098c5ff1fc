// SPDX-FileCopyrightText: 2026 Warden Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Live provider handles and the factories that build them.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::WardenError;
use crate::types::{Definition, PluginKind};

/// A live plugin instance built from a [`Definition`].
///
/// A provider is owned by exactly one registry entry. Callers resolving it
/// through the registry receive a shared handle but never stop it themselves.
#[async_trait]
pub trait Provider: Send + Sync + 'static {
    /// Releases any held resources (connection pools, sockets, caches).
    ///
    /// May perform I/O. Errors are logged by the registry, never propagated.
    async fn stop(&self) -> Result<(), WardenError>;
}

/// Builds providers of one plugin kind from their definitions.
///
/// Factories are wired explicitly at startup, one per [`PluginKind`].
#[async_trait]
pub trait ProviderFactory: Send + Sync + 'static {
    /// The provider type handed to protocol handlers.
    type Provider: Provider + ?Sized;

    /// The kind this factory produces.
    fn kind(&self) -> PluginKind;

    /// Create a new provider from the definition's configuration.
    ///
    /// May block on I/O (e.g. contacting a directory server); the registry
    /// never calls this from the event dispatch path.
    async fn create(&self, definition: &Definition) -> Result<Arc<Self::Provider>, WardenError>;
}
