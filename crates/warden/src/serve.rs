// SPDX-FileCopyrightText: 2026 Warden Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `warden serve` command implementation.
//!
//! Opens the definition directory, deploys one set of plugin registries per
//! domain, watches the directory for changes and serves the health surface
//! until SIGINT or SIGTERM.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};
use warden_bus::EventBus;
use warden_config::model::{LogConfig, LogFormat, WardenConfig};
use warden_core::{DefinitionStore, DomainId, PluginKind, WardenError};
use warden_plugin::{CatalogFactory, ExtensionManager, ReadinessTracker};
use warden_storage::{DefinitionWatcher, FileDefinitionStore};

use crate::shutdown;

/// Runs the `warden serve` command.
pub async fn run_serve(config: WardenConfig) -> Result<(), WardenError> {
    init_tracing(&config.log);

    info!(version = env!("CARGO_PKG_VERSION"), "starting warden serve");

    let root = &config.definitions.path;
    std::fs::create_dir_all(root).map_err(WardenError::storage)?;
    let store = Arc::new(FileDefinitionStore::open(root)?);
    let bus = Arc::new(EventBus::new());
    let readiness = Arc::new(ReadinessTracker::new());
    let cancel = shutdown::install_signal_handler();

    #[cfg(feature = "gateway")]
    let gateway = if config.gateway.enabled {
        let server_config = warden_gateway::ServerConfig {
            host: config.gateway.host.clone(),
            port: config.gateway.port,
        };
        let listener = warden_gateway::bind(&server_config).await?;
        let mut state = warden_gateway::HealthState::new(Arc::clone(&readiness));
        if let Some(render) = prometheus_render(&config) {
            state = state.with_metrics(render);
        }
        Some(tokio::spawn(warden_gateway::serve(
            listener,
            state,
            cancel.clone(),
        )))
    } else {
        debug!("gateway disabled by configuration");
        None
    };

    let manager = build_manager(&config, store.clone(), Arc::clone(&bus), Arc::clone(&readiness));

    let domains = select_domains(&config, &store)?;
    if domains.is_empty() {
        warn!(root = %root.display(), "no domains to deploy");
    }
    for domain in domains {
        if let Err(e) = manager.deploy_domain(domain.clone()).await {
            error!(%domain, error = %e, "failed to deploy domain");
        }
    }

    let watcher = if config.definitions.watch {
        let handle = DefinitionWatcher::new(Arc::clone(&store), Arc::clone(&bus))
            .debounce(Duration::from_millis(config.definitions.debounce_ms))
            .spawn(cancel.clone())?;
        // Pick up files that changed between the initial scan and the watch.
        let published = DefinitionWatcher::new(Arc::clone(&store), Arc::clone(&bus))
            .sync()
            .await?;
        if published > 0 {
            info!(published, "applied definition changes made during startup");
        }
        Some(handle)
    } else {
        debug!("definition watching disabled by configuration");
        None
    };

    info!(domains = manager.domains().len(), "warden ready");

    cancel.cancelled().await;
    info!("shutdown requested");

    manager.shutdown().await;
    if let Some(handle) = watcher {
        let _ = handle.await;
    }

    #[cfg(feature = "gateway")]
    if let Some(handle) = gateway {
        match handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(error = %e, "gateway server failed"),
            Err(e) => error!(error = %e, "gateway task panicked"),
        }
    }

    info!("warden stopped");
    Ok(())
}

/// One catalog-backed registry per plugin kind.
fn build_manager(
    config: &WardenConfig,
    store: Arc<dyn DefinitionStore>,
    bus: Arc<EventBus>,
    readiness: Arc<ReadinessTracker>,
) -> ExtensionManager {
    PluginKind::ALL
        .iter()
        .fold(
            ExtensionManager::builder(store, bus)
                .readiness(readiness)
                .startup_policy(config.registry.startup_policy),
            |builder, kind| builder.with_kind(Arc::new(CatalogFactory::new(*kind))),
        )
        .build()
}

/// Configured domains, or every subdirectory of the definition root.
fn select_domains(
    config: &WardenConfig,
    store: &FileDefinitionStore,
) -> Result<Vec<DomainId>, WardenError> {
    if config.registry.domains.is_empty() {
        return store.domain_directories();
    }
    Ok(config
        .registry
        .domains
        .iter()
        .map(|domain| DomainId::from(domain.as_str()))
        .collect())
}

#[cfg(feature = "gateway")]
fn prometheus_render(config: &WardenConfig) -> Option<warden_gateway::MetricsRender> {
    if !config.prometheus.enabled {
        debug!("prometheus metrics disabled by configuration");
        return None;
    }

    #[cfg(feature = "prometheus")]
    let render: Option<warden_gateway::MetricsRender> =
        match warden_prometheus::PrometheusExporter::install() {
            Ok(exporter) => {
                info!("prometheus metrics enabled");
                Some(Arc::new(move || exporter.render()))
            }
            Err(e) => {
                warn!(error = %e, "prometheus initialization failed, continuing without metrics");
                None
            }
        };

    #[cfg(not(feature = "prometheus"))]
    let render: Option<warden_gateway::MetricsRender> = {
        warn!("prometheus.enabled is set but this binary was built without the prometheus feature");
        None
    };

    render
}

fn init_tracing(log: &LogConfig) {
    use tracing_subscriber::EnvFilter;

    let level = log.level.trim().to_ascii_lowercase();
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warden={level},warn")));

    match log.format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init(),
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_names(false)
            .init(),
    }
}
