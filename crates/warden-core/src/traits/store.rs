// SPDX-FileCopyrightText: 2026 Warden Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Read access to persisted plugin definitions.

use async_trait::async_trait;

use crate::error::WardenError;
use crate::types::{Definition, PluginId, ReferenceType};

/// Source of plugin definitions.
///
/// The registry only reads; administrative writes happen elsewhere and are
/// announced on the event bus.
#[async_trait]
pub trait DefinitionStore: Send + Sync + 'static {
    /// All definitions attached to the given reference, of every kind.
    async fn find_all(
        &self,
        reference_type: ReferenceType,
        reference_id: &str,
    ) -> Result<Vec<Definition>, WardenError>;

    /// A single definition, or `None` when it does not exist (anymore).
    async fn find_by_id(&self, id: &PluginId) -> Result<Option<Definition>, WardenError>;
}
