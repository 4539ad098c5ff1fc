// SPDX-FileCopyrightText: 2026 Warden Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Warden integration tests.
//!
//! Provides mock providers and a test harness for fast, deterministic tests
//! without directory servers or definition files.
//!
//! # Components
//!
//! - [`MockFactory`] - Provider factory with scriptable failures and latency
//! - [`FlakyStore`] - In-memory definition store that can be taken offline
//! - [`TestHarness`] - Bus, store, readiness tracker and manager wired together

pub mod harness;
pub mod mock_factory;
pub mod store;

pub use harness::{TestHarness, TestHarnessBuilder, definition, newer};
pub use mock_factory::{MockFactory, MockProvider};
pub use store::FlakyStore;
