// SPDX-FileCopyrightText: 2026 Warden Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-process event bus for plugin deploy/update/undeploy notifications.

pub mod bus;

pub use bus::{EventBus, EventHandler, SubscriberId};
