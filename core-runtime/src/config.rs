//! # Core Configuration Module
//!
//! Provides configuration management for the audio delivery engine.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a `CoreConfig`
//! holding the tunable policy (thresholds, capacities, timeouts) and the bridge
//! handles the engine reads from. `build()` runs fail-fast validation so a
//! misconfigured server refuses to start instead of misbehaving at runtime.
//!
//! ## Bridges
//!
//! - `AudioCatalog` - required, or a `catalog_path` the service can load
//! - `AudioStorage` - required, or a `media_dir` the service can read from
//! - `ThroughputProbe` - optional; without it only client-reported speeds feed
//!   the network estimate
//! - `Clock` - optional, defaults to `SystemClock`
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//!
//! let config = CoreConfig::builder()
//!     .catalog_path("/srv/audio/catalog.json")
//!     .media_dir("/srv/audio")
//!     .preload_cache_mb(128)
//!     .build()
//!     .expect("Failed to build config");
//! ```

use crate::error::{Error, Result};
use bridge_traits::{AudioCatalog, AudioStorage, Clock, SystemClock, ThroughputProbe};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Upper bound for the preload cache (4 GiB).
const MAX_PRELOAD_CACHE_MB: usize = 4096;

/// Core configuration for the audio delivery engine.
///
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// Address the HTTP API binds to
    pub bind_address: SocketAddr,

    /// Directory containing stored audio files
    pub media_dir: Option<PathBuf>,

    /// JSON manifest describing the catalog
    pub catalog_path: Option<PathBuf>,

    /// Preload cache capacity in megabytes
    pub preload_cache_mb: usize,

    /// Network tier thresholds and probing
    pub network: NetworkSettings,

    /// Preload policy
    pub preload: PreloadSettings,

    /// Behavior history retention
    pub behavior: BehaviorSettings,

    /// Feature flags
    pub features: FeatureFlags,

    /// Catalog collaborator (optional when `catalog_path` is set)
    pub catalog: Option<Arc<dyn AudioCatalog>>,

    /// Storage collaborator (optional when `media_dir` is set)
    pub storage: Option<Arc<dyn AudioStorage>>,

    /// Throughput probe (optional)
    pub probe: Option<Arc<dyn ThroughputProbe>>,

    /// Time source
    pub clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("bind_address", &self.bind_address)
            .field("media_dir", &self.media_dir)
            .field("catalog_path", &self.catalog_path)
            .field("preload_cache_mb", &self.preload_cache_mb)
            .field("network", &self.network)
            .field("preload", &self.preload)
            .field("behavior", &self.behavior)
            .field("features", &self.features)
            .field("catalog", &self.catalog.as_ref().map(|_| "AudioCatalog { ... }"))
            .field("storage", &self.storage.as_ref().map(|_| "AudioStorage { ... }"))
            .field("probe", &self.probe.as_ref().map(|_| "ThroughputProbe { ... }"))
            .finish()
    }
}

/// Network estimation settings.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkSettings {
    /// Speeds at or above this are `high` (Mbps)
    pub high_threshold_mbps: f64,
    /// Speeds below this are `low` (Mbps)
    pub low_threshold_mbps: f64,
    /// Samples older than this are treated as unknown
    pub sample_stale_after: Duration,
    /// Timeout for a single probe
    pub probe_timeout: Duration,
    /// Interval for periodic probing, when enabled
    pub probe_interval: Option<Duration>,
    /// URL the desktop probe downloads from
    pub probe_url: Option<String>,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            high_threshold_mbps: 5.0,
            low_threshold_mbps: 1.0,
            sample_stale_after: Duration::from_secs(300),
            probe_timeout: Duration::from_secs(8),
            probe_interval: None,
            probe_url: None,
        }
    }
}

/// Preload policy settings.
#[derive(Debug, Clone, PartialEq)]
pub struct PreloadSettings {
    /// Timeout for one preload fetch
    pub fetch_timeout: Duration,
    /// How many playlist items after the current one are considered
    pub playlist_lookahead: usize,
    /// Battery percentage below which mobile devices skip preloading
    pub critical_battery_percent: f64,
}

impl Default for PreloadSettings {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_secs(8),
            playlist_lookahead: 5,
            critical_battery_percent: 15.0,
        }
    }
}

/// Behavior history settings.
#[derive(Debug, Clone, PartialEq)]
pub struct BehaviorSettings {
    /// Events kept per user before the oldest are dropped
    pub max_events_per_user: usize,
    /// Events older than this many days are removed
    pub retention_days: u32,
    /// Interval for the background cleanup, when scheduled by the service
    pub cleanup_interval: Option<Duration>,
}

impl Default for BehaviorSettings {
    fn default() -> Self {
        Self {
            max_events_per_user: 500,
            retention_days: 90,
            cleanup_interval: Some(Duration::from_secs(3600)),
        }
    }
}

/// Feature flags control optional functionality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureFlags {
    /// Accept preload triggers
    pub enable_preloading: bool,

    /// Let the network estimate drive `auto` quality selection
    pub enable_adaptive_streaming: bool,

    /// Run the throughput probe on `probe_interval` (requires a probe)
    pub enable_periodic_probe: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            enable_preloading: true,
            enable_adaptive_streaming: true,
            enable_periodic_probe: false,
        }
    }
}

impl CoreConfig {
    /// Creates a new builder for constructing a `CoreConfig`.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Preload cache capacity in bytes.
    pub fn preload_cache_bytes(&self) -> u64 {
        self.preload_cache_mb as u64 * 1024 * 1024
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - A catalog and a storage source are available
    /// - Cache size is reasonable (> 0 and <= 4 GiB)
    /// - Network thresholds are ordered and positive
    /// - Retention settings are non-zero
    /// - Feature flags are consistent with available bridges
    pub fn validate(&self) -> Result<()> {
        if self.catalog.is_none() && self.catalog_path.is_none() {
            return Err(Error::CapabilityMissing {
                capability: "AudioCatalog".to_string(),
                message: "Provide an AudioCatalog implementation or a catalog manifest path \
                          (--catalog / DELIVERY_CATALOG)."
                    .to_string(),
            });
        }

        if self.storage.is_none() && self.media_dir.is_none() {
            return Err(Error::CapabilityMissing {
                capability: "AudioStorage".to_string(),
                message: "Provide an AudioStorage implementation or a media directory \
                          (--media-dir / DELIVERY_MEDIA_DIR)."
                    .to_string(),
            });
        }

        if let Some(path) = &self.catalog_path {
            if path.as_os_str().is_empty() {
                return Err(Error::Config("Catalog path cannot be empty".to_string()));
            }
        }

        if let Some(dir) = &self.media_dir {
            if dir.as_os_str().is_empty() {
                return Err(Error::Config("Media directory cannot be empty".to_string()));
            }
        }

        if self.preload_cache_mb == 0 {
            return Err(Error::Config(
                "Preload cache size must be greater than 0 MB".to_string(),
            ));
        }

        if self.preload_cache_mb > MAX_PRELOAD_CACHE_MB {
            return Err(Error::Config(format!(
                "Preload cache size exceeds maximum of {} MB",
                MAX_PRELOAD_CACHE_MB
            )));
        }

        let net = &self.network;
        if !(net.low_threshold_mbps > 0.0 && net.high_threshold_mbps > net.low_threshold_mbps) {
            return Err(Error::Config(format!(
                "Network thresholds must satisfy 0 < low ({}) < high ({})",
                net.low_threshold_mbps, net.high_threshold_mbps
            )));
        }

        if net.probe_timeout.is_zero() || self.preload.fetch_timeout.is_zero() {
            return Err(Error::Config("Timeouts must be greater than zero".to_string()));
        }

        if self.behavior.max_events_per_user == 0 || self.behavior.retention_days == 0 {
            return Err(Error::Config(
                "Behavior history cap and retention must be greater than zero".to_string(),
            ));
        }

        if !(0.0..=100.0).contains(&self.preload.critical_battery_percent) {
            return Err(Error::Config(
                "Critical battery percentage must be within 0..=100".to_string(),
            ));
        }

        if self.features.enable_periodic_probe {
            if self.probe.is_none() && net.probe_url.is_none() {
                return Err(Error::Config(
                    "Periodic probing enabled but no ThroughputProbe or probe URL provided. \
                     Disable the feature or configure a probe."
                        .to_string(),
                ));
            }
            if net.probe_interval.is_none() {
                return Err(Error::Config(
                    "Periodic probing enabled but no probe interval set".to_string(),
                ));
            }
        }

        Ok(())
    }
}

/// Builder for [`CoreConfig`].
#[derive(Default)]
pub struct CoreConfigBuilder {
    bind_address: Option<SocketAddr>,
    media_dir: Option<PathBuf>,
    catalog_path: Option<PathBuf>,
    preload_cache_mb: Option<usize>,
    network: NetworkSettings,
    preload: PreloadSettings,
    behavior: BehaviorSettings,
    features: FeatureFlags,
    catalog: Option<Arc<dyn AudioCatalog>>,
    storage: Option<Arc<dyn AudioStorage>>,
    probe: Option<Arc<dyn ThroughputProbe>>,
    clock: Option<Arc<dyn Clock>>,
}

impl CoreConfigBuilder {
    pub fn bind_address(mut self, addr: SocketAddr) -> Self {
        self.bind_address = Some(addr);
        self
    }

    pub fn media_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.media_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn catalog_path(mut self, path: impl AsRef<Path>) -> Self {
        self.catalog_path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn preload_cache_mb(mut self, mb: usize) -> Self {
        self.preload_cache_mb = Some(mb);
        self
    }

    pub fn network_thresholds(mut self, low_mbps: f64, high_mbps: f64) -> Self {
        self.network.low_threshold_mbps = low_mbps;
        self.network.high_threshold_mbps = high_mbps;
        self
    }

    pub fn sample_stale_after(mut self, after: Duration) -> Self {
        self.network.sample_stale_after = after;
        self
    }

    pub fn probe_timeout(mut self, timeout: Duration) -> Self {
        self.network.probe_timeout = timeout;
        self
    }

    pub fn probe_interval(mut self, interval: Duration) -> Self {
        self.network.probe_interval = Some(interval);
        self
    }

    pub fn probe_url(mut self, url: impl Into<String>) -> Self {
        self.network.probe_url = Some(url.into());
        self
    }

    pub fn preload_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.preload.fetch_timeout = timeout;
        self
    }

    pub fn playlist_lookahead(mut self, count: usize) -> Self {
        self.preload.playlist_lookahead = count;
        self
    }

    pub fn critical_battery_percent(mut self, percent: f64) -> Self {
        self.preload.critical_battery_percent = percent;
        self
    }

    pub fn behavior_max_events_per_user(mut self, count: usize) -> Self {
        self.behavior.max_events_per_user = count;
        self
    }

    pub fn behavior_retention_days(mut self, days: u32) -> Self {
        self.behavior.retention_days = days;
        self
    }

    pub fn behavior_cleanup_interval(mut self, interval: Option<Duration>) -> Self {
        self.behavior.cleanup_interval = interval;
        self
    }

    pub fn enable_preloading(mut self, enable: bool) -> Self {
        self.features.enable_preloading = enable;
        self
    }

    pub fn enable_adaptive_streaming(mut self, enable: bool) -> Self {
        self.features.enable_adaptive_streaming = enable;
        self
    }

    pub fn enable_periodic_probe(mut self, enable: bool) -> Self {
        self.features.enable_periodic_probe = enable;
        self
    }

    pub fn catalog(mut self, catalog: Arc<dyn AudioCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn storage(mut self, storage: Arc<dyn AudioStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn probe(mut self, probe: Arc<dyn ThroughputProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Builds the configuration, validating it first.
    pub fn build(self) -> Result<CoreConfig> {
        let config = CoreConfig {
            bind_address: self
                .bind_address
                .unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 8080))),
            media_dir: self.media_dir,
            catalog_path: self.catalog_path,
            preload_cache_mb: self.preload_cache_mb.unwrap_or(64),
            network: self.network,
            preload: self.preload,
            behavior: self.behavior,
            features: self.features,
            catalog: self.catalog,
            storage: self.storage,
            probe: self.probe,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
        };

        config.validate()?;
        Ok(config)
    }
}
