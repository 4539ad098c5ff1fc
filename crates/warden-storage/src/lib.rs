// SPDX-FileCopyrightText: 2026 Warden Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Definition stores for the Warden plugin runtime.
//!
//! Provides an in-memory store that announces its writes on the event bus,
//! a read-only store over a directory of TOML definition files, and a
//! watcher that turns changes to that directory into bus events.

pub mod files;
pub mod memory;
pub mod watcher;

pub use files::{FileDefinitionStore, parse_definition};
pub use memory::InMemoryDefinitionStore;
pub use watcher::DefinitionWatcher;
