//! Core service façade and bootstrap helpers.
//!
//! This crate wires host-provided bridge implementations (catalog, storage,
//! throughput probe, clock) into the delivery engine and exposes it over HTTP.
//! Servers typically enable the `desktop-shims` feature (which depends on
//! `bridge-desktop`) so the bridges can be built from paths in the
//! configuration; embedders inject their own through [`CoreDependencies`].

pub mod api;
pub mod error;

pub use error::{CoreError, Result};

use std::sync::Arc;

use bridge_traits::{AudioCatalog, AudioStorage, Clock, ThroughputProbe};
use core_behavior::{AnalyzerConfig, UserBehaviorAnalyzer};
use core_delivery::{
    IntelligentPreloader, MetadataCache, NetworkMonitor, NetworkMonitorConfig, PreloadCache, PreloadCacheConfig,
    PreloaderConfig, QualityProfileSelector, RangeRequestHandler,
};
use core_runtime::config::CoreConfig;
use core_runtime::events::{CoreEvent, EventBus, EventStream};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Aggregated handle to all bridge dependencies the core requires.
#[derive(Clone)]
pub struct CoreDependencies {
    pub catalog: Arc<dyn AudioCatalog>,
    pub storage: Arc<dyn AudioStorage>,
    pub probe: Option<Arc<dyn ThroughputProbe>>,
    pub clock: Arc<dyn Clock>,
}

impl CoreDependencies {
    /// Construct a dependency bundle from explicit bridge handles.
    pub fn new(catalog: Arc<dyn AudioCatalog>, storage: Arc<dyn AudioStorage>, clock: Arc<dyn Clock>) -> Self {
        Self {
            catalog,
            storage,
            probe: None,
            clock,
        }
    }

    pub fn with_probe(mut self, probe: Arc<dyn ThroughputProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Take the bridges injected into `config`, failing on missing ones.
    pub fn from_config(config: &CoreConfig) -> Result<Self> {
        let catalog = config.catalog.clone().ok_or_else(|| CoreError::CapabilityMissing {
            capability: "AudioCatalog".to_string(),
            message: "No catalog was injected".to_string(),
        })?;
        let storage = config.storage.clone().ok_or_else(|| CoreError::CapabilityMissing {
            capability: "AudioStorage".to_string(),
            message: "No storage was injected".to_string(),
        })?;
        Ok(Self {
            catalog,
            storage,
            probe: config.probe.clone(),
            clock: config.clock.clone(),
        })
    }
}

/// Primary façade: every engine component, wired once and shared.
pub struct DeliveryService {
    config: CoreConfig,
    deps: CoreDependencies,
    event_bus: Arc<EventBus>,
    metadata: Arc<MetadataCache>,
    range_handler: RangeRequestHandler,
    network: Arc<NetworkMonitor>,
    selector: QualityProfileSelector,
    analyzer: Arc<UserBehaviorAnalyzer>,
    cache: Arc<PreloadCache>,
    preloader: Arc<IntelligentPreloader>,
    shutdown: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl DeliveryService {
    /// Create a new service from the provided configuration and dependencies.
    pub fn new(config: CoreConfig, deps: CoreDependencies) -> Result<Self> {
        let cache_config = PreloadCacheConfig::new().with_capacity_bytes(config.preload_cache_bytes());
        cache_config.validate().map_err(CoreError::InitializationFailed)?;

        let event_bus = Arc::new(EventBus::default());
        let clock = deps.clock.clone();

        let metadata = Arc::new(MetadataCache::new(deps.catalog.clone(), clock.clone()));

        let mut network = NetworkMonitor::new(NetworkMonitorConfig::from(&config.network), clock.clone())
            .with_event_bus(event_bus.clone());
        if let Some(probe) = &deps.probe {
            network = network.with_probe(probe.clone());
        }
        let network = Arc::new(network);

        let analyzer = Arc::new(
            UserBehaviorAnalyzer::new(AnalyzerConfig::from(&config.behavior), deps.catalog.clone(), clock.clone())
                .with_event_bus(event_bus.clone()),
        );

        let cache = Arc::new(PreloadCache::new(cache_config, clock.clone()).with_event_bus(event_bus.clone()));

        let preloader = Arc::new(
            IntelligentPreloader::new(
                PreloaderConfig::from(&config.preload).with_enabled(config.features.enable_preloading),
                metadata.clone(),
                deps.storage.clone(),
                network.clone(),
                cache.clone(),
                clock,
            )
            .with_analyzer(analyzer.clone())
            .with_event_bus(event_bus.clone()),
        );

        Ok(Self {
            selector: QualityProfileSelector::new(config.features.enable_adaptive_streaming),
            config,
            deps,
            event_bus,
            metadata,
            range_handler: RangeRequestHandler::new(),
            network,
            analyzer,
            cache,
            preloader,
            shutdown: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        })
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// Access the bridge dependencies being used by the service.
    pub fn dependencies(&self) -> &CoreDependencies {
        &self.deps
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    pub fn metadata(&self) -> &Arc<MetadataCache> {
        &self.metadata
    }

    pub fn range_handler(&self) -> &RangeRequestHandler {
        &self.range_handler
    }

    pub fn network(&self) -> &Arc<NetworkMonitor> {
        &self.network
    }

    pub fn selector(&self) -> &QualityProfileSelector {
        &self.selector
    }

    pub fn analyzer(&self) -> &Arc<UserBehaviorAnalyzer> {
        &self.analyzer
    }

    pub fn cache(&self) -> &Arc<PreloadCache> {
        &self.cache
    }

    pub fn preloader(&self) -> &Arc<IntelligentPreloader> {
        &self.preloader
    }

    /// Start the periodic probe, behavior cleanup and preload event logging.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start_background_tasks(&self) {
        let mut tasks = self.tasks.lock();

        if self.config.features.enable_periodic_probe {
            match self.config.network.probe_interval {
                Some(interval) if self.network.has_probe() => {
                    info!(?interval, "Starting periodic network probe");
                    tasks.push(self.network.spawn_refresh(interval, self.shutdown.child_token()));
                }
                _ => warn!("Periodic probe enabled without a probe or interval"),
            }
        }

        if let Some(interval) = self.config.behavior.cleanup_interval {
            debug!(?interval, "Starting behavior cleanup loop");
            tasks.push(self.analyzer.spawn_cleanup(interval, self.shutdown.child_token()));
        }

        tasks.push(spawn_preload_logger(&self.event_bus, self.shutdown.child_token()));
    }

    /// Stop background work and abandon in-flight preload fetches.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let cancelled = self.preloader.cancel_all();
        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Background task ended abnormally");
            }
        }
        info!(cancelled_fetches = cancelled, "Delivery service stopped");
    }

    /// Token cancelled when the service shuts down.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }
}

fn spawn_preload_logger(bus: &EventBus, token: CancellationToken) -> JoinHandle<()> {
    let mut stream = EventStream::new(bus.subscribe()).filter(|event| matches!(event, CoreEvent::Preload(_)));
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                received = stream.recv() => match received {
                    Ok(event) => debug!(
                        severity = ?event.severity(),
                        event = event.description(),
                        "Preload event"
                    ),
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Preload event logger lagged");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                },
            }
        }
    })
}

/// Build a service from configuration, creating desktop bridges for any
/// collaborator that was given as a path instead of an injected handle.
#[cfg(all(feature = "desktop-shims", not(target_arch = "wasm32")))]
pub async fn bootstrap(config: CoreConfig) -> Result<DeliveryService> {
    use bridge_desktop::{FsAudioStorage, HttpThroughputProbe, JsonCatalog};

    let catalog: Arc<dyn AudioCatalog> = match (&config.catalog, &config.catalog_path) {
        (Some(catalog), _) => catalog.clone(),
        (None, Some(path)) => {
            let catalog = JsonCatalog::from_path(path).await?;
            info!(path = %path.display(), items = catalog.len(), "Loaded audio catalog");
            Arc::new(catalog)
        }
        (None, None) => {
            return Err(CoreError::CapabilityMissing {
                capability: "AudioCatalog".to_string(),
                message: "Provide a catalog or a catalog path".to_string(),
            })
        }
    };

    let storage: Arc<dyn AudioStorage> = match (&config.storage, &config.media_dir) {
        (Some(storage), _) => storage.clone(),
        (None, Some(dir)) => Arc::new(FsAudioStorage::new(dir.clone())),
        (None, None) => {
            return Err(CoreError::CapabilityMissing {
                capability: "AudioStorage".to_string(),
                message: "Provide a storage bridge or a media directory".to_string(),
            })
        }
    };

    let probe: Option<Arc<dyn ThroughputProbe>> = match (&config.probe, &config.network.probe_url) {
        (Some(probe), _) => Some(probe.clone()),
        (None, Some(url)) => Some(Arc::new(HttpThroughputProbe::new(url.clone())?)),
        (None, None) => None,
    };

    let mut deps = CoreDependencies::new(catalog, storage, config.clock.clone());
    if let Some(probe) = probe {
        deps = deps.with_probe(probe);
    }
    DeliveryService::new(config, deps)
}
