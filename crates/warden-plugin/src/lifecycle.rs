// SPDX-FileCopyrightText: 2026 Warden Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Startup, event handling, and shutdown of one plugin registry.
//!
//! The lifecycle subscribes the registry to its event class and domain, runs
//! the bulk load, and translates bus events into registry transitions. The
//! bus callback only filters and enqueues: every transition runs on the tokio
//! runtime, ordered per plugin id by a [`KeyedSequencer`].
//!
//! Events that arrive while the bulk load is running are held back and
//! released, in arrival order, once the load has finished.

use std::sync::{Arc, Mutex, OnceLock, PoisonError, Weak};

use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use warden_bus::{EventBus, EventHandler, SubscriberId};
use warden_core::{
    DefinitionStore, DomainId, EventAction, PluginEvent, PluginId, PluginKind, ProviderFactory,
    StartupPolicy, WardenError,
};

use crate::readiness::ReadinessTracker;
use crate::registry::PluginRegistry;
use crate::sequencer::KeyedSequencer;

/// Progress of the bulk load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadState {
    Pending,
    /// Number of ids that ended with a live provider.
    Loaded(usize),
    Failed(String),
}

enum Gate {
    Buffering(Vec<PluginEvent>),
    Open,
    Closed,
}

struct LifecycleInner<F: ProviderFactory> {
    registry: Arc<PluginRegistry<F>>,
    bus: Arc<EventBus>,
    readiness: Arc<ReadinessTracker>,
    policy: StartupPolicy,
    sequencer: KeyedSequencer<PluginId>,
    subscription: Mutex<Option<SubscriberId>>,
    runtime: OnceLock<Handle>,
    gate: Mutex<Gate>,
    load_state: watch::Sender<LoadState>,
    // Whether stop() drops the domain's readiness state.
    owns_domain_state: bool,
}

/// Drives one [`PluginRegistry`] from startup to shutdown.
pub struct RegistryLifecycle<F: ProviderFactory> {
    inner: Arc<LifecycleInner<F>>,
}

impl<F: ProviderFactory> Clone for RegistryLifecycle<F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<F: ProviderFactory> RegistryLifecycle<F> {
    /// A standalone lifecycle: [`stop`](Self::stop) also drops the domain's
    /// readiness state.
    pub fn new(
        domain: DomainId,
        factory: Arc<F>,
        store: Arc<dyn DefinitionStore>,
        bus: Arc<EventBus>,
        readiness: Arc<ReadinessTracker>,
        policy: StartupPolicy,
    ) -> Self {
        Self::build(domain, factory, store, bus, readiness, policy, true)
    }

    /// One of several lifecycles sharing a domain. Stopping it leaves the
    /// domain's readiness state to whoever groups them.
    pub(crate) fn new_member(
        domain: DomainId,
        factory: Arc<F>,
        store: Arc<dyn DefinitionStore>,
        bus: Arc<EventBus>,
        readiness: Arc<ReadinessTracker>,
        policy: StartupPolicy,
    ) -> Self {
        Self::build(domain, factory, store, bus, readiness, policy, false)
    }

    fn build(
        domain: DomainId,
        factory: Arc<F>,
        store: Arc<dyn DefinitionStore>,
        bus: Arc<EventBus>,
        readiness: Arc<ReadinessTracker>,
        policy: StartupPolicy,
        owns_domain_state: bool,
    ) -> Self {
        let registry = Arc::new(PluginRegistry::new(
            domain,
            factory,
            store,
            Arc::clone(&readiness),
        ));
        let (load_state, _) = watch::channel(LoadState::Pending);
        Self {
            inner: Arc::new(LifecycleInner {
                registry,
                bus,
                readiness,
                policy,
                sequencer: KeyedSequencer::new(),
                subscription: Mutex::new(None),
                runtime: OnceLock::new(),
                gate: Mutex::new(Gate::Buffering(Vec::new())),
                load_state,
                owns_domain_state,
            }),
        }
    }

    pub fn registry(&self) -> &Arc<PluginRegistry<F>> {
        &self.inner.registry
    }

    pub fn domain(&self) -> &DomainId {
        self.inner.registry.domain()
    }

    pub fn kind(&self) -> PluginKind {
        self.inner.registry.kind()
    }

    pub fn policy(&self) -> StartupPolicy {
        self.inner.policy
    }

    /// Subscribe to the bus and run the bulk load.
    ///
    /// With [`StartupPolicy::Blocking`] this returns once the load finished,
    /// propagating a failed `find_all`. With [`StartupPolicy::NonBlocking`]
    /// the load runs on a spawned task and this returns immediately; use
    /// [`loaded`](Self::loaded) to wait for it.
    pub async fn start(&self) -> Result<(), WardenError> {
        let inner = &self.inner;
        let runtime = Handle::try_current().map_err(|e| {
            WardenError::Internal(format!("registry lifecycle requires a tokio runtime: {e}"))
        })?;
        if inner.runtime.set(runtime.clone()).is_err() {
            return Err(WardenError::Internal(format!(
                "registry {}/{} already started",
                self.domain(),
                self.kind()
            )));
        }

        let weak: Weak<LifecycleInner<F>> = Arc::downgrade(inner);
        let handler: EventHandler = Arc::new(move |event: &PluginEvent| {
            if let Some(inner) = weak.upgrade() {
                inner.on_event(event);
            }
        });
        let subscriber = inner.bus.subscribe(
            self.kind(),
            self.domain().clone(),
            format!("registry:{}:{}", self.domain(), self.kind()),
            handler,
        );
        *inner
            .subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(subscriber);

        info!(
            domain = %self.domain(),
            kind = %self.kind(),
            policy = ?inner.policy,
            "starting plugin registry"
        );

        match inner.policy {
            StartupPolicy::Blocking => inner.run_load().await.map(|_| ()),
            StartupPolicy::NonBlocking => {
                let inner = Arc::clone(inner);
                runtime.spawn(async move {
                    let _ = inner.run_load().await;
                });
                Ok(())
            }
        }
    }

    /// Current progress of the bulk load.
    pub fn load_state(&self) -> LoadState {
        self.inner.load_state.borrow().clone()
    }

    /// Wait for the bulk load to finish. Never resolves before `start`.
    pub async fn loaded(&self) -> Result<usize, WardenError> {
        let mut rx = self.inner.load_state.subscribe();
        let state = rx
            .wait_for(|state| *state != LoadState::Pending)
            .await
            .map_err(|e| WardenError::Internal(format!("load state channel closed: {e}")))?
            .clone();
        match state {
            LoadState::Loaded(live) => Ok(live),
            LoadState::Failed(message) => Err(WardenError::Internal(format!(
                "bulk load of {}/{} failed: {message}",
                self.domain(),
                self.kind()
            ))),
            LoadState::Pending => Err(WardenError::Internal("bulk load still pending".into())),
        }
    }

    /// Wait until the bulk load and every queued transition have finished.
    pub async fn settle(&self) {
        if self.inner.runtime.get().is_none() {
            return;
        }
        let _ = self.loaded().await;
        self.inner.sequencer.wait_idle().await;
    }

    /// Unsubscribe and shut the registry down. A standalone lifecycle also
    /// drops the domain's readiness state.
    pub async fn stop(&self) {
        let inner = &self.inner;
        let subscriber = inner
            .subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(subscriber) = subscriber {
            inner.bus.unsubscribe(subscriber);
        }

        // Closed under the gate lock: no event handler can mark a plugin
        // pending once this returns.
        let discarded = {
            let mut gate = inner.gate.lock().unwrap_or_else(PoisonError::into_inner);
            match std::mem::replace(&mut *gate, Gate::Closed) {
                Gate::Buffering(events) => events.len(),
                Gate::Open | Gate::Closed => 0,
            }
        };
        if discarded > 0 {
            debug!(domain = %self.domain(), kind = %self.kind(), discarded, "dropping events buffered during load");
        }

        inner.registry.shutdown().await;
        if inner.owns_domain_state {
            inner.readiness.remove_domain(self.domain());
        }
        info!(domain = %self.domain(), kind = %self.kind(), "plugin registry stopped");
    }
}

impl<F: ProviderFactory> LifecycleInner<F> {
    async fn run_load(self: &Arc<Self>) -> Result<usize, WardenError> {
        let result = self.registry.load().await;
        self.open_gate();
        match &result {
            Ok(live) => {
                self.load_state.send_replace(LoadState::Loaded(*live));
            }
            Err(e) => {
                error!(
                    domain = %self.registry.domain(),
                    kind = %self.registry.kind(),
                    error = %e,
                    "bulk load of plugin definitions failed"
                );
                self.load_state
                    .send_replace(LoadState::Failed(e.to_string()));
            }
        }
        result
    }

    // Called on the publisher's thread: filter, mark pending, enqueue.
    fn on_event(self: &Arc<Self>, event: &PluginEvent) {
        let domain = self.registry.domain();
        if event.class != self.registry.kind() || !event.targets_domain(domain) {
            return;
        }

        let mut gate = self.gate.lock().unwrap_or_else(PoisonError::into_inner);
        if matches!(*gate, Gate::Closed) || self.registry.is_closed() {
            return;
        }
        self.readiness
            .init_plugin_sync(domain, &event.payload.id, Some(self.registry.kind()));
        match &mut *gate {
            Gate::Buffering(pending) => {
                debug!(
                    domain = %domain,
                    plugin = %event.payload.id,
                    action = %event.action,
                    "bulk load running, holding event back"
                );
                pending.push(event.clone());
            }
            Gate::Open => self.enqueue(event.clone()),
            Gate::Closed => {}
        }
    }

    fn open_gate(self: &Arc<Self>) {
        let mut gate = self.gate.lock().unwrap_or_else(PoisonError::into_inner);
        let pending = match &mut *gate {
            Gate::Buffering(pending) => std::mem::take(pending),
            Gate::Open | Gate::Closed => return,
        };
        *gate = Gate::Open;
        // Still under the gate lock so later events queue behind these.
        for event in pending {
            self.enqueue(event);
        }
    }

    fn enqueue(self: &Arc<Self>, event: PluginEvent) {
        let Some(runtime) = self.runtime.get() else {
            warn!(plugin = %event.payload.id, "event received before start, dropping");
            return;
        };
        let inner = Arc::clone(self);
        let key = event.payload.id.clone();
        self.sequencer.submit(runtime, key, async move {
            inner.apply(event).await;
        });
    }

    async fn apply(&self, event: PluginEvent) {
        if self.registry.is_closed() {
            return;
        }
        let id = &event.payload.id;
        let domain = self.registry.domain();
        let kind = self.registry.kind();

        match event.action {
            EventAction::Deploy | EventAction::Update => {
                match self.registry.store().find_by_id(id).await {
                    Ok(Some(definition)) => {
                        if definition.kind != kind || &definition.domain_id != domain {
                            warn!(
                                %domain,
                                %kind,
                                plugin = %id,
                                definition_domain = %definition.domain_id,
                                definition_kind = %definition.kind,
                                "stored definition does not match the event, evicting"
                            );
                            self.registry
                                .evict(id, "definition does not match event domain or kind")
                                .await;
                            return;
                        }
                        self.registry.upsert(definition).await;
                    }
                    Ok(None) => {
                        self.registry.evict(id, "definition not found").await;
                    }
                    Err(e) => {
                        warn!(
                            %domain,
                            %kind,
                            plugin = %id,
                            error = %e,
                            "failed to fetch plugin definition, keeping current provider"
                        );
                        self.registry.mark_failed(id, &e.to_string()).await;
                    }
                }
            }
            EventAction::Undeploy => {
                self.registry.remove(id).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use warden_core::{Definition, DomainStatus};

    use super::*;
    use crate::testing::{Gate as CreateGate, MemStore, TestFactory, scope};

    struct Fixture {
        lifecycle: RegistryLifecycle<TestFactory>,
        factory: Arc<TestFactory>,
        store: Arc<MemStore>,
        bus: Arc<EventBus>,
        readiness: Arc<ReadinessTracker>,
    }

    fn fixture(factory: TestFactory, definitions: Vec<Definition>, policy: StartupPolicy) -> Fixture {
        let factory = Arc::new(factory);
        let store = Arc::new(MemStore::with(definitions));
        let bus = Arc::new(EventBus::new());
        let readiness = Arc::new(ReadinessTracker::new());
        let lifecycle = RegistryLifecycle::new(
            DomainId::from("d1"),
            Arc::clone(&factory),
            Arc::clone(&store) as Arc<dyn DefinitionStore>,
            Arc::clone(&bus),
            Arc::clone(&readiness),
            policy,
        );
        Fixture {
            lifecycle,
            factory,
            store,
            bus,
            readiness,
        }
    }

    fn event(action: EventAction, def: &Definition) -> PluginEvent {
        PluginEvent::new(def.kind, action, def.payload())
    }

    #[tokio::test]
    async fn blocking_start_loads_before_returning() {
        let fx = fixture(
            TestFactory::default(),
            vec![scope("a"), scope("b")],
            StartupPolicy::Blocking,
        );

        fx.lifecycle.start().await.unwrap();

        assert_eq!(fx.lifecycle.registry().len(), 2);
        assert_eq!(fx.lifecycle.load_state(), LoadState::Loaded(2));
        assert_eq!(fx.bus.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn deploy_event_refetches_and_installs() {
        let fx = fixture(TestFactory::default(), vec![], StartupPolicy::Blocking);
        fx.lifecycle.start().await.unwrap();

        let def = scope("s1");
        fx.store.put(def.clone());
        assert_eq!(fx.bus.publish(event(EventAction::Deploy, &def)), 1);
        fx.lifecycle.settle().await;

        assert!(fx.lifecycle.registry().get(&def.id).is_some());
        assert!(fx.readiness.is_domain_synchronized(&DomainId::from("d1")));
    }

    #[tokio::test]
    async fn events_for_other_domains_and_kinds_are_ignored() {
        let fx = fixture(TestFactory::default(), vec![], StartupPolicy::Blocking);
        fx.lifecycle.start().await.unwrap();

        let other_domain = Definition::new("x", PluginKind::Scope, "d2", "scope", chrono::Utc::now());
        let other_kind =
            Definition::new("y", PluginKind::IdentityProvider, "d1", "inline-idp", chrono::Utc::now());
        fx.store.put(other_domain.clone());
        fx.store.put(other_kind.clone());
        fx.bus.publish(event(EventAction::Deploy, &other_domain));
        fx.bus.publish(event(EventAction::Deploy, &other_kind));
        fx.lifecycle.settle().await;

        assert!(fx.lifecycle.registry().is_empty());
        assert_eq!(fx.factory.created(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn update_then_undeploy_leaves_nothing_alive() {
        let def = scope("s1");
        let fx = fixture(TestFactory::default(), vec![def.clone()], StartupPolicy::Blocking);
        fx.lifecycle.start().await.unwrap();

        let mut newer = def.clone();
        newer.updated_at = def.updated_at + Duration::seconds(1);
        fx.store.put(newer.clone());
        fx.bus.publish(event(EventAction::Update, &newer));
        fx.store.delete("s1");
        fx.bus.publish(event(EventAction::Undeploy, &newer));
        fx.lifecycle.settle().await;

        assert!(fx.lifecycle.registry().get(&def.id).is_none());
        assert_eq!(fx.factory.live(), 0);
        let state = fx.readiness.get_domain_state(&DomainId::from("d1")).unwrap();
        assert!(state.plugin(&def.id).is_none());
    }

    #[tokio::test]
    async fn missing_definition_is_evicted_and_failed() {
        let def = scope("s1");
        let fx = fixture(TestFactory::default(), vec![def.clone()], StartupPolicy::Blocking);
        fx.lifecycle.start().await.unwrap();

        fx.store.delete("s1");
        fx.bus.publish(event(EventAction::Update, &def));
        fx.lifecycle.settle().await;

        assert!(fx.lifecycle.registry().get(&def.id).is_none());
        assert_eq!(fx.factory.stops(), 1);
        let state = fx.readiness.get_domain_state(&DomainId::from("d1")).unwrap();
        let status = state.plugin(&def.id).unwrap();
        assert!(!status.success);
        assert_eq!(status.message.as_deref(), Some("definition not found"));
    }

    #[tokio::test]
    async fn store_error_keeps_provider_but_marks_failed() {
        let def = scope("s1");
        let fx = fixture(TestFactory::default(), vec![def.clone()], StartupPolicy::Blocking);
        fx.lifecycle.start().await.unwrap();

        fx.store.set_unavailable(true);
        fx.bus.publish(event(EventAction::Update, &def));
        fx.lifecycle.settle().await;

        assert!(fx.lifecycle.registry().get(&def.id).is_some());
        let state = fx.readiness.get_domain_state(&DomainId::from("d1")).unwrap();
        let status = state.plugin(&def.id).unwrap();
        assert!(!status.success);
        assert!(status.message.as_deref().unwrap().contains("store offline"));
    }

    #[tokio::test]
    async fn blocking_start_propagates_store_failure() {
        let fx = fixture(TestFactory::default(), vec![scope("a")], StartupPolicy::Blocking);
        fx.store.set_unavailable(true);

        assert!(fx.lifecycle.start().await.is_err());
        assert!(matches!(fx.lifecycle.load_state(), LoadState::Failed(_)));
        assert!(fx.lifecycle.loaded().await.is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn non_blocking_start_orders_events_behind_load() {
        let gate = Arc::new(CreateGate::default());
        let factory = TestFactory {
            gate: Some(Arc::clone(&gate)),
            ..Default::default()
        };
        let def = scope("a");
        let fx = fixture(factory, vec![def.clone()], StartupPolicy::NonBlocking);

        fx.lifecycle.start().await.unwrap();
        gate.entered.notified().await;
        assert_eq!(fx.lifecycle.load_state(), LoadState::Pending);

        fx.store.delete("a");
        fx.bus.publish(event(EventAction::Undeploy, &def));
        gate.release.notify_one();

        assert_eq!(fx.lifecycle.loaded().await.unwrap(), 1);
        fx.lifecycle.settle().await;

        assert!(fx.lifecycle.registry().get(&def.id).is_none());
        assert_eq!(fx.factory.created(), 1);
        assert_eq!(fx.factory.stops(), 1);
        assert!(fx.readiness.is_domain_synchronized(&DomainId::from("d1")));
    }

    #[tokio::test]
    async fn stop_unsubscribes_and_clears_state() {
        let fx = fixture(TestFactory::default(), vec![scope("a")], StartupPolicy::Blocking);
        fx.lifecycle.start().await.unwrap();
        let domain = DomainId::from("d1");
        fx.readiness.update_domain_status(&domain, DomainStatus::Deployed);

        fx.lifecycle.stop().await;

        assert_eq!(fx.bus.subscriber_count(), 0);
        assert!(fx.lifecycle.registry().is_empty());
        assert_eq!(fx.factory.stops(), 1);
        assert!(fx.readiness.get_domain_state(&domain).is_none());

        let late = scope("b");
        fx.store.put(late.clone());
        assert_eq!(fx.bus.publish(event(EventAction::Deploy, &late)), 0);
        assert_eq!(fx.factory.created(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn events_racing_stop_leave_no_readiness_state() {
        let fx = fixture(TestFactory::default(), vec![], StartupPolicy::Blocking);
        fx.lifecycle.start().await.unwrap();
        let domain = DomainId::from("d1");
        for n in 0..32 {
            fx.store.put(scope(&format!("s{n}")));
        }

        // Delivery keeps going as if the handler was snapshotted before
        // the unsubscribe.
        let inner = Arc::clone(&fx.lifecycle.inner);
        let publisher = std::thread::spawn(move || {
            for round in 0..200 {
                let def = scope(&format!("s{}", round % 32));
                inner.on_event(&event(EventAction::Deploy, &def));
            }
        });
        fx.lifecycle.stop().await;
        publisher.join().unwrap();
        fx.lifecycle.settle().await;

        assert!(fx.readiness.get_domain_state(&domain).is_none());
        assert!(fx.lifecycle.registry().is_empty());

        let late = scope("late");
        fx.lifecycle.inner.on_event(&event(EventAction::Deploy, &late));
        fx.lifecycle.settle().await;
        assert!(fx.readiness.get_domain_state(&domain).is_none());
    }

    #[tokio::test]
    async fn second_start_is_refused() {
        let fx = fixture(TestFactory::default(), vec![], StartupPolicy::Blocking);
        fx.lifecycle.start().await.unwrap();
        assert!(fx.lifecycle.start().await.is_err());
    }
}
