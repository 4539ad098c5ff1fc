// SPDX-FileCopyrightText: 2026 Warden Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Event bus delivering plugin notifications to class/domain scoped handlers.
//!
//! Handlers run on the publisher's thread, one after another, in
//! registration-independent order. A handler must return quickly: anything
//! that may block (building a provider, stopping one) belongs on a worker.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, trace, warn};
use uuid::Uuid;
use warden_core::{DomainId, PluginEvent, PluginKind};

/// Callback invoked for every matching event.
pub type EventHandler = Arc<dyn Fn(&PluginEvent) + Send + Sync>;

/// Registration handle returned by [`EventBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(Uuid);

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

struct Subscription {
    class: PluginKind,
    domain: DomainId,
    name: String,
    handler: EventHandler,
}

/// In-process event bus.
///
/// Subscriptions are keyed by `(event class, domain)`: a subscriber only
/// sees events of its class whose payload references its domain.
#[derive(Default)]
pub struct EventBus {
    subscriptions: DashMap<SubscriberId, Subscription>,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriptions.len())
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for one event class within one domain.
    pub fn subscribe(
        &self,
        class: PluginKind,
        domain: DomainId,
        name: impl Into<String>,
        handler: EventHandler,
    ) -> SubscriberId {
        let id = SubscriberId(Uuid::new_v4());
        let name = name.into();
        debug!(subscriber = %name, %class, %domain, "subscriber registered");
        self.subscriptions.insert(
            id,
            Subscription {
                class,
                domain,
                name,
                handler,
            },
        );
        id
    }

    /// Remove a subscription. Returns `true` if it existed.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        match self.subscriptions.remove(&id) {
            Some((_, sub)) => {
                debug!(subscriber = %sub.name, class = %sub.class, domain = %sub.domain, "subscriber unregistered");
                true
            }
            None => false,
        }
    }

    /// Deliver an event to every matching subscriber.
    ///
    /// Returns the number of handlers invoked. A panicking handler is logged
    /// and does not prevent delivery to the others.
    pub fn publish(&self, event: PluginEvent) -> usize {
        // Snapshot first so handlers may (un)subscribe without deadlocking.
        let targets: Vec<(String, EventHandler)> = self
            .subscriptions
            .iter()
            .filter(|sub| {
                sub.class == event.class && sub.domain.as_str() == event.payload.reference_id
            })
            .map(|sub| (sub.name.clone(), Arc::clone(&sub.handler)))
            .collect();

        trace!(
            class = %event.class,
            action = %event.action,
            plugin = %event.payload.id,
            receivers = targets.len(),
            "publishing plugin event"
        );

        for (name, handler) in &targets {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                handler(&event);
            }));
            if result.is_err() {
                warn!(
                    subscriber = %name,
                    plugin = %event.payload.id,
                    "event subscriber panicked"
                );
            }
        }

        targets.len()
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.subscriptions.len()
    }
}
