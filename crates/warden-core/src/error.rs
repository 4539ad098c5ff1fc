// SPDX-FileCopyrightText: 2026 Warden Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Warden plugin runtime.

use thiserror::Error;

use crate::types::{DomainId, PluginId, PluginKind};

/// The primary error type used across Warden traits and core operations.
#[derive(Debug, Error)]
pub enum WardenError {
    /// Configuration errors (invalid TOML, bad definition files, missing keys).
    #[error("configuration error: {0}")]
    Config(String),

    /// Definition store errors (backend unreachable, unreadable files).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A provider factory could not build a provider, or a provider failed to stop.
    #[error("{kind} provider error: {message}")]
    Provider {
        kind: PluginKind,
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The definition store has no definition with this id.
    #[error("definition not found: {0}")]
    DefinitionNotFound(PluginId),

    /// Event bus subscription or delivery errors.
    #[error("event bus error: {0}")]
    Bus(String),

    /// The registry was shut down and refuses further work.
    #[error("registry {domain}/{kind} is shut down")]
    Shutdown { domain: DomainId, kind: PluginKind },

    /// HTTP health surface errors (bind failure, server crash).
    #[error("gateway error: {message}")]
    Gateway {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl WardenError {
    /// Shorthand for a provider error without an underlying cause.
    pub fn provider(kind: PluginKind, message: impl Into<String>) -> Self {
        WardenError::Provider {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Wraps any error as a storage error.
    pub fn storage<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        WardenError::Storage {
            source: Box::new(err),
        }
    }
}
