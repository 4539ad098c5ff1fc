// SPDX-FileCopyrightText: 2026 Warden Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Watches the definition directory and publishes changes on the event bus.
//!
//! ```text
//! filesystem events (notify)
//!   -> debounce
//!   -> FileDefinitionStore::rescan (blocking pool)
//!   -> EventBus::publish per changed definition
//! ```

use std::sync::Arc;
use std::time::Duration;

use notify_debouncer_mini::notify::RecursiveMode;
use notify_debouncer_mini::{DebounceEventResult, new_debouncer};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use warden_bus::EventBus;
use warden_core::WardenError;

use crate::files::FileDefinitionStore;

/// Default debounce interval for file change events.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

/// Turns definition file changes into bus events.
pub struct DefinitionWatcher {
    store: Arc<FileDefinitionStore>,
    bus: Arc<EventBus>,
    debounce: Duration,
}

impl DefinitionWatcher {
    pub fn new(store: Arc<FileDefinitionStore>, bus: Arc<EventBus>) -> Self {
        Self {
            store,
            bus,
            debounce: DEFAULT_DEBOUNCE,
        }
    }

    pub fn debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Rescan the directory once and publish the difference.
    ///
    /// Returns the number of events published.
    pub async fn sync(&self) -> Result<usize, WardenError> {
        let store = Arc::clone(&self.store);
        let events = tokio::task::spawn_blocking(move || store.rescan())
            .await
            .map_err(|e| WardenError::Internal(format!("definition rescan panicked: {e}")))??;

        let count = events.len();
        for event in events {
            debug!(
                plugin = %event.payload.id,
                action = %event.action,
                domain = %event.payload.reference_id,
                "publishing definition change"
            );
            self.bus.publish(event);
        }
        Ok(count)
    }

    /// Start watching the store's root directory until `cancel` fires.
    ///
    /// Fails if the filesystem watcher cannot be created.
    pub fn spawn(self, cancel: CancellationToken) -> Result<JoinHandle<()>, WardenError> {
        let (tx, mut rx) = mpsc::unbounded_channel::<DebounceEventResult>();
        let mut debouncer = new_debouncer(self.debounce, move |result: DebounceEventResult| {
            let _ = tx.send(result);
        })
        .map_err(WardenError::storage)?;
        debouncer
            .watcher()
            .watch(self.store.root(), RecursiveMode::Recursive)
            .map_err(WardenError::storage)?;

        info!(
            root = %self.store.root().display(),
            debounce_ms = self.debounce.as_millis() as u64,
            "watching definition directory"
        );

        Ok(tokio::spawn(async move {
            // Dropping the debouncer stops filesystem monitoring.
            let _debouncer = debouncer;
            loop {
                tokio::select! {
                    () = cancel.cancelled() => {
                        debug!("definition watcher cancelled");
                        break;
                    }
                    result = rx.recv() => match result {
                        Some(Ok(events)) => {
                            if events.is_empty() {
                                continue;
                            }
                            if let Err(e) = self.sync().await {
                                warn!(error = %e, "failed to rescan definition directory");
                            }
                        }
                        Some(Err(e)) => {
                            warn!(error = ?e, "definition watcher error");
                        }
                        None => {
                            debug!("definition watcher channel closed, stopping");
                            break;
                        }
                    }
                }
            }
        }))
    }
}
