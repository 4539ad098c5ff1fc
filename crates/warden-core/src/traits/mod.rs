// SPDX-FileCopyrightText: 2026 Warden Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Trait seams between the registry and its external collaborators.

pub mod provider;
pub mod store;

pub use provider::{Provider, ProviderFactory};
pub use store::DefinitionStore;
