//! # Intelligent Preloader
//!
//! Predicts what a listener will play next and pulls the first chunk of each
//! prediction into the [`PreloadCache`].
//!
//! ## Overview
//!
//! One `preload_intelligently` call runs five steps:
//!
//! 1. **Gate**: skip when preloading is off, the network is unsuitable, or a
//!    mobile device is low on battery
//! 2. **Candidates**: next items of the current playlist, items related to the
//!    current one, and personalized recommendations
//! 3. **Scoring**: weighted sum of similarity, playlist proximity, recency and
//!    preference signals ([`scoring`])
//! 4. **Fetch**: the top `max_concurrent` candidates are read concurrently,
//!    each bounded by the strategy's chunk size and the fetch timeout
//! 5. **Admission**: successful reads become cache entries
//!
//! ## Cancellation
//!
//! Every call takes a new generation number. Fetches still running for ids
//! outside the new candidate set are cancelled, and a fetch whose generation
//! is no longer current is never admitted.
//!
//! ## Usage
//!
//! ```ignore
//! let preloader = IntelligentPreloader::new(config, metadata, storage, network, cache, clock)
//!     .with_analyzer(analyzer)
//!     .with_event_bus(bus);
//!
//! let report = preloader
//!     .preload_intelligently(PreloadContext::new("episode-12").with_user("u1"))
//!     .await?;
//! ```

pub mod context;
pub mod scoring;

pub use context::{DeviceType, PreloadContext, UserPreferences};
pub use scoring::{CandidateSignals, CandidateSummary, ScoredCandidate, ScoringWeights};

use crate::cache::{PreloadCache, PreloadCacheStats};
use crate::error::{DeliveryError, Result};
use crate::metadata::MetadataCache;
use crate::network::{NetworkMetrics, NetworkMonitor, NetworkQuality, PreloadStrategy, SampleSource};
use crate::quality::RequestedQuality;
use bridge_traits::{AudioDescriptor, AudioStorage, Clock};
use bytes::Bytes;
use core_behavior::UserBehaviorAnalyzer;
use core_runtime::config::PreloadSettings;
use core_runtime::events::{CoreEvent, EventBus, PreloadEvent};
use futures::future::join_all;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

// ============================================================================
// Configuration
// ============================================================================

/// Preloader tuning.
#[derive(Debug, Clone)]
pub struct PreloaderConfig {
    /// Server-wide switch
    pub enabled: bool,
    /// Playlist items after the current one that are considered
    pub playlist_lookahead: usize,
    pub fetch_timeout: Duration,
    /// Mobile battery percentage below which preloading is skipped
    pub critical_battery_percent: f64,
    /// How many related items are requested from the catalog
    pub related_limit: usize,
    /// How many personalized recommendations are requested
    pub recommendation_limit: usize,
    pub weights: ScoringWeights,
}

impl Default for PreloaderConfig {
    fn default() -> Self {
        Self::from(&PreloadSettings::default())
    }
}

impl From<&PreloadSettings> for PreloaderConfig {
    fn from(settings: &PreloadSettings) -> Self {
        Self {
            enabled: true,
            playlist_lookahead: settings.playlist_lookahead,
            fetch_timeout: settings.fetch_timeout,
            critical_battery_percent: settings.critical_battery_percent,
            related_limit: 20,
            recommendation_limit: 10,
            weights: ScoringWeights::default(),
        }
    }
}

impl PreloaderConfig {
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

// ============================================================================
// Report
// ============================================================================

/// Why a preload call did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkipReason {
    /// Disabled server-wide
    Disabled,
    /// The listener turned preloading off
    UserDisabled,
    /// Network estimate is low or stale
    NetworkUnsuitable,
    /// The client reports a slow connection
    ClientNetworkLow,
    /// Mobile device under the critical battery level
    LowBattery,
}

impl SkipReason {
    pub fn message(&self) -> &'static str {
        match self {
            SkipReason::Disabled => "Preloading is disabled",
            SkipReason::UserDisabled => "Preloading is disabled in user preferences",
            SkipReason::NetworkUnsuitable => "Network not suitable for preloading",
            SkipReason::ClientNetworkLow => "Client reports a slow connection",
            SkipReason::LowBattery => "Battery level too low for preloading",
        }
    }
}

/// A fetch that did not make it into the cache.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedFetch {
    pub audio_id: String,
    pub message: String,
}

/// Outcome of one `preload_intelligently` call.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreloadReport {
    pub generation: u64,
    pub current_audio_id: String,
    /// Set when the call was a no-op
    pub skipped: Option<SkipReason>,
    /// Quality label the chunks were cached under
    pub quality: String,
    /// Every scored candidate, best first
    pub candidates: Vec<CandidateSummary>,
    /// Newly admitted ids
    pub cached: Vec<String>,
    /// Selected ids that were already cached
    pub already_cached: Vec<String>,
    /// Selected ids still being fetched by an earlier call
    pub in_flight: Vec<String>,
    pub failed: Vec<FailedFetch>,
    /// Ids whose fetch was abandoned (this call's or superseded earlier ones)
    pub cancelled: Vec<String>,
    pub strategy: PreloadStrategy,
    pub network: NetworkMetrics,
    pub cache: PreloadCacheStats,
}

impl PreloadReport {
    pub fn is_skipped(&self) -> bool {
        self.skipped.is_some()
    }
}

// ============================================================================
// Preloader
// ============================================================================

struct InFlight {
    generation: u64,
    /// `current_audio_id` of the call that started the fetch
    origin: String,
    token: CancellationToken,
}

/// Owns one `in_flight` registration; the entry goes away with the guard
/// unless a newer generation has taken the slot.
struct FlightGuard<'a> {
    in_flight: &'a Mutex<HashMap<String, InFlight>>,
    audio_id: String,
    generation: u64,
}

impl FlightGuard<'_> {
    /// Release the slot, reporting whether this fetch still owned it.
    fn release(&self) -> bool {
        let mut in_flight = self.in_flight.lock();
        let owned = matches!(
            in_flight.get(&self.audio_id),
            Some(flight) if flight.generation == self.generation && !flight.token.is_cancelled()
        );
        if owned {
            in_flight.remove(&self.audio_id);
        }
        owned
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        let mut in_flight = self.in_flight.lock();
        if matches!(in_flight.get(&self.audio_id), Some(flight) if flight.generation == self.generation) {
            in_flight.remove(&self.audio_id);
        }
    }
}

enum FetchOutcome {
    Admitted(String),
    Failed(FailedFetch),
    Cancelled(String),
}

/// Orchestrates candidate selection and background fetches.
pub struct IntelligentPreloader {
    config: PreloaderConfig,
    metadata: Arc<MetadataCache>,
    storage: Arc<dyn AudioStorage>,
    network: Arc<NetworkMonitor>,
    cache: Arc<PreloadCache>,
    analyzer: Option<Arc<UserBehaviorAnalyzer>>,
    clock: Arc<dyn Clock>,
    generation: AtomicU64,
    in_flight: Mutex<HashMap<String, InFlight>>,
    event_bus: Option<Arc<EventBus>>,
}

impl IntelligentPreloader {
    pub fn new(
        config: PreloaderConfig,
        metadata: Arc<MetadataCache>,
        storage: Arc<dyn AudioStorage>,
        network: Arc<NetworkMonitor>,
        cache: Arc<PreloadCache>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            metadata,
            storage,
            network,
            cache,
            analyzer: None,
            clock,
            generation: AtomicU64::new(0),
            in_flight: Mutex::new(HashMap::new()),
            event_bus: None,
        }
    }

    /// Use behavior history for personalized candidates.
    pub fn with_analyzer(mut self, analyzer: Arc<UserBehaviorAnalyzer>) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    /// Set event bus for preload lifecycle events.
    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn config(&self) -> &PreloaderConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<PreloadCache> {
        &self.cache
    }

    /// Playback consumed `audio_id`.
    pub fn record_access(&self, audio_id: &str) -> bool {
        self.cache.record_access(audio_id)
    }

    /// Number of fetches currently running.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.lock().len()
    }

    /// Abandon every running fetch. Returns how many were cancelled.
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<(String, InFlight)> = self.in_flight.lock().drain().collect();
        for (audio_id, flight) in &drained {
            flight.token.cancel();
            self.emit(PreloadEvent::Cancelled {
                audio_id: audio_id.clone(),
            });
        }
        drained.len()
    }

    fn emit(&self, event: PreloadEvent) {
        if let Some(bus) = &self.event_bus {
            bus.emit(CoreEvent::Preload(event)).ok();
        }
    }

    fn gate(&self, context: &PreloadContext) -> Option<SkipReason> {
        if !self.config.enabled {
            return Some(SkipReason::Disabled);
        }
        if !context.user_preferences.preload_enabled {
            return Some(SkipReason::UserDisabled);
        }
        if context.is_battery_critical(self.config.critical_battery_percent) {
            return Some(SkipReason::LowBattery);
        }
        if context.client_network_quality() == Some(NetworkQuality::Low) {
            return Some(SkipReason::ClientNetworkLow);
        }
        if !self.network.is_suitable_for_preloading() {
            return Some(SkipReason::NetworkUnsuitable);
        }
        None
    }

    fn cache_quality(&self, context: &PreloadContext, metrics: &NetworkMetrics) -> String {
        match RequestedQuality::parse_lenient(context.user_preferences.preferred_quality.as_deref()) {
            RequestedQuality::Auto => metrics.quality.as_str().to_string(),
            explicit => explicit.as_str().to_string(),
        }
    }

    /// Predict and preload the next tracks for a listener.
    ///
    /// A gated call is a no-op that still returns a report. Individual
    /// fetch failures are reported, never returned as errors.
    ///
    /// # Errors
    ///
    /// `DeliveryError::InvalidContext` when the context fails validation.
    #[instrument(skip(self, context), fields(current = %context.current_audio_id))]
    pub async fn preload_intelligently(&self, context: PreloadContext) -> Result<PreloadReport> {
        context.validate()?;

        if let Some(speed) = context.network_speed {
            self.network.record_sample(speed, SampleSource::Client);
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let metrics = self.network.current_metrics();
        let strategy = self.network.recommended_preload_strategy();
        let quality = self.cache_quality(&context, &metrics);

        let mut report = PreloadReport {
            generation,
            current_audio_id: context.current_audio_id.clone(),
            skipped: None,
            quality: quality.clone(),
            candidates: Vec::new(),
            cached: Vec::new(),
            already_cached: Vec::new(),
            in_flight: Vec::new(),
            failed: Vec::new(),
            cancelled: Vec::new(),
            strategy,
            network: metrics,
            cache: PreloadCacheStats::default(),
        };

        if let Some(reason) = self.gate(&context) {
            info!(reason = reason.message(), "Preload skipped");
            self.emit(PreloadEvent::Skipped {
                reason: reason.message().to_string(),
            });
            report.skipped = Some(reason);
            report.cache = self.cache.stats();
            return Ok(report);
        }

        let candidates = self.gather_candidates(&context).await;
        report.candidates = candidates.iter().map(CandidateSummary::from).collect();

        let relevant: HashSet<&str> = candidates.iter().map(|c| c.audio.id()).collect();
        let selected: Vec<&ScoredCandidate> = candidates.iter().take(strategy.max_concurrent).collect();

        // Supersede fetches started for another track and register ours under one lock.
        let mut jobs = Vec::new();
        {
            let mut in_flight = self.in_flight.lock();
            let stale: Vec<String> = in_flight
                .iter()
                .filter(|(id, flight)| flight.origin != context.current_audio_id && !relevant.contains(id.as_str()))
                .map(|(id, _)| id.clone())
                .collect();
            for audio_id in stale {
                if let Some(flight) = in_flight.remove(&audio_id) {
                    flight.token.cancel();
                    debug!(audio_id = %audio_id, "Cancelled superseded preload fetch");
                    self.emit(PreloadEvent::Cancelled {
                        audio_id: audio_id.clone(),
                    });
                    report.cancelled.push(audio_id);
                }
            }

            for candidate in &selected {
                let audio_id = candidate.audio.id();
                if self.cache.contains(audio_id, &quality) {
                    report.already_cached.push(audio_id.to_string());
                } else if in_flight.contains_key(audio_id) {
                    report.in_flight.push(audio_id.to_string());
                } else {
                    let token = CancellationToken::new();
                    in_flight.insert(
                        audio_id.to_string(),
                        InFlight {
                            generation,
                            origin: context.current_audio_id.clone(),
                            token: token.clone(),
                        },
                    );
                    let guard = FlightGuard {
                        in_flight: &self.in_flight,
                        audio_id: audio_id.to_string(),
                        generation,
                    };
                    jobs.push(((*candidate).clone(), token, guard));
                }
            }
        }

        self.emit(PreloadEvent::Started {
            current_audio_id: context.current_audio_id.clone(),
            candidates: jobs.len(),
        });
        debug!(
            generation,
            candidates = candidates.len(),
            fetching = jobs.len(),
            max_concurrent = strategy.max_concurrent,
            time_of_day = context.time_of_day.as_deref().unwrap_or("unspecified"),
            "Starting preload fetches"
        );

        let fetches = jobs.into_iter().map(|(candidate, token, guard)| {
            self.fetch_and_admit(candidate.audio, token, guard, strategy.chunk_size, &quality)
        });
        for outcome in join_all(fetches).await {
            match outcome {
                FetchOutcome::Admitted(audio_id) => report.cached.push(audio_id),
                FetchOutcome::Failed(failed) => report.failed.push(failed),
                FetchOutcome::Cancelled(audio_id) => report.cancelled.push(audio_id),
            }
        }

        info!(
            generation,
            cached = report.cached.len(),
            failed = report.failed.len(),
            cancelled = report.cancelled.len(),
            "Preload finished"
        );
        report.cache = self.cache.stats();
        Ok(report)
    }

    /// Union of playlist, related and personalized candidates, scored and ranked.
    async fn gather_candidates(&self, context: &PreloadContext) -> Vec<ScoredCandidate> {
        let current_id = context.current_audio_id.as_str();
        let current = match self.metadata.get(current_id).await {
            Ok(found) => found,
            Err(e) => {
                warn!(audio_id = current_id, error = %e, "Current audio lookup failed");
                None
            }
        };

        let mut pool: HashMap<String, (AudioDescriptor, CandidateSignals)> = HashMap::new();
        let mut add = |audio: AudioDescriptor, signals: CandidateSignals| {
            if audio.id() == current_id {
                return;
            }
            pool.entry(audio.id().to_string())
                .and_modify(|(_, existing)| existing.merge(signals))
                .or_insert((audio, signals));
        };

        // (a) next items in the playlist
        if let Some(position) = context.current_playlist.iter().position(|id| id == current_id) {
            let upcoming = context
                .current_playlist
                .iter()
                .skip(position + 1)
                .take(self.config.playlist_lookahead)
                .enumerate();
            for (offset, audio_id) in upcoming {
                match self.metadata.get(audio_id).await {
                    Ok(Some(audio)) => add(
                        audio,
                        CandidateSignals {
                            playlist_distance: Some(offset + 1),
                            ..CandidateSignals::default()
                        },
                    ),
                    Ok(None) => debug!(audio_id = %audio_id, "Skipping unknown playlist item"),
                    Err(e) => warn!(audio_id = %audio_id, error = %e, "Playlist item lookup failed"),
                }
            }
        }

        // (b) items related to the current one
        if current.is_some() {
            match self.metadata.catalog().related(current_id, self.config.related_limit).await {
                Ok(related) => {
                    for audio in related {
                        add(
                            audio,
                            CandidateSignals {
                                related: true,
                                ..CandidateSignals::default()
                            },
                        );
                    }
                }
                Err(e) => warn!(error = %e, "Related lookup failed"),
            }
        }

        // (c) personalized recommendations
        if let (Some(analyzer), Some(user_id)) = (&self.analyzer, context.user_id.as_deref()) {
            match analyzer
                .generate_personalized_recommendations(user_id, self.config.recommendation_limit)
                .await
            {
                Ok(recommendations) => {
                    for recommendation in recommendations {
                        add(
                            recommendation.audio,
                            CandidateSignals {
                                personalized: true,
                                ..CandidateSignals::default()
                            },
                        );
                    }
                }
                Err(e) => warn!(user_id, error = %e, "Recommendation lookup failed"),
            }
        }

        let now = self.clock.now();
        let mut scored: Vec<ScoredCandidate> = pool
            .into_values()
            .map(|(audio, signals)| {
                let score = scoring::score_candidate(
                    current.as_ref(),
                    &audio,
                    &signals,
                    context,
                    self.config.playlist_lookahead,
                    now,
                    &self.config.weights,
                );
                ScoredCandidate { audio, signals, score }
            })
            .collect();
        scoring::rank(&mut scored);
        scored
    }

    async fn read_prefix(&self, audio: &AudioDescriptor, chunk_size: usize, token: &CancellationToken) -> Result<Bytes> {
        let len = (chunk_size as u64).min(audio.metadata.file_size);
        if len == 0 {
            return Err(DeliveryError::Internal("audio file is empty".to_string()));
        }

        let read = tokio::time::timeout(
            self.config.fetch_timeout,
            self.storage.read_range(&audio.storage_key, 0, len),
        );
        tokio::select! {
            _ = token.cancelled() => Err(DeliveryError::Cancelled),
            result = read => match result {
                Ok(Ok(bytes)) => Ok(bytes),
                Ok(Err(e)) => Err(e.into()),
                Err(_) => Err(DeliveryError::Timeout(format!(
                    "preload fetch exceeded {:?}",
                    self.config.fetch_timeout
                ))),
            },
        }
    }

    async fn fetch_and_admit(
        &self,
        audio: AudioDescriptor,
        token: CancellationToken,
        guard: FlightGuard<'_>,
        chunk_size: usize,
        quality: &str,
    ) -> FetchOutcome {
        let audio_id = audio.id().to_string();
        let result = self.read_prefix(&audio, chunk_size, &token).await;

        // Only the fetch that still owns the slot may admit.
        let current = guard.release();
        let generation = guard.generation;
        drop(guard);

        match result {
            _ if !current => {
                debug!(audio_id = %audio_id, generation, "Discarding stale preload result");
                FetchOutcome::Cancelled(audio_id)
            }
            Err(DeliveryError::Cancelled) => FetchOutcome::Cancelled(audio_id),
            Ok(bytes) => {
                if self.cache.insert(&audio_id, quality, bytes).is_admitted() {
                    FetchOutcome::Admitted(audio_id)
                } else {
                    FetchOutcome::Failed(FailedFetch {
                        audio_id,
                        message: "chunk rejected by cache".to_string(),
                    })
                }
            }
            Err(e) => {
                warn!(audio_id = %audio_id, error = %e, "Preload fetch failed");
                self.emit(PreloadEvent::Failed {
                    audio_id: audio_id.clone(),
                    message: e.to_string(),
                });
                FetchOutcome::Failed(FailedFetch {
                    audio_id,
                    message: e.to_string(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::PreloadCacheConfig;
    use crate::network::NetworkMonitorConfig;
    use async_trait::async_trait;
    use bridge_traits::error::{BridgeError, Result as BridgeResult};
    use bridge_traits::{AudioCatalog, AudioFormat, AudioMetadata, ManualClock, RangeReader};
    use chrono::{TimeZone, Utc};

    struct Catalog {
        items: Vec<AudioDescriptor>,
    }

    #[async_trait]
    impl AudioCatalog for Catalog {
        async fn get_audio(&self, id: &str) -> BridgeResult<Option<AudioDescriptor>> {
            Ok(self.items.iter().find(|d| d.id() == id).cloned())
        }

        async fn related(&self, id: &str, limit: usize) -> BridgeResult<Vec<AudioDescriptor>> {
            let Some(current) = self.items.iter().find(|d| d.id() == id) else {
                return Ok(Vec::new());
            };
            Ok(self
                .items
                .iter()
                .filter(|d| current.is_related_to(d))
                .take(limit)
                .cloned()
                .collect())
        }

        async fn list_recent(&self, limit: usize) -> BridgeResult<Vec<AudioDescriptor>> {
            Ok(self.items.iter().take(limit).cloned().collect())
        }
    }

    struct Storage {
        fail_on: Option<String>,
    }

    #[async_trait]
    impl AudioStorage for Storage {
        async fn read_range(&self, key: &str, start: u64, len: u64) -> BridgeResult<Bytes> {
            if self.fail_on.as_deref() == Some(key) {
                return Err(BridgeError::Io(std::io::Error::other("disk error")));
            }
            Ok(Bytes::from(vec![(start % 251) as u8; len as usize]))
        }

        async fn open_range(&self, _key: &str, _start: u64, _len: u64) -> BridgeResult<RangeReader> {
            Err(BridgeError::NotAvailable("not used".to_string()))
        }
    }

    fn audio(id: &str, category: &str) -> AudioDescriptor {
        AudioDescriptor {
            metadata: AudioMetadata {
                id: id.to_string(),
                file_size: 1_000_000,
                duration: 300.0,
                bitrate: 128,
                format: AudioFormat::Mp3,
            },
            title: id.to_string(),
            category: Some(category.to_string()),
            speaker: None,
            tags: Vec::new(),
            uploaded_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            storage_key: format!("{id}.mp3"),
        }
    }

    fn preloader(fail_on: Option<&str>) -> IntelligentPreloader {
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()));
        let catalog = Arc::new(Catalog {
            items: vec![
                audio("cur", "science"),
                audio("p1", "history"),
                audio("p2", "history"),
                audio("r1", "science"),
                audio("r2", "science"),
            ],
        });
        let metadata = Arc::new(MetadataCache::new(catalog, clock.clone()));
        let network = Arc::new(NetworkMonitor::new(NetworkMonitorConfig::default(), clock.clone()));
        let cache = Arc::new(PreloadCache::new(PreloadCacheConfig::default(), clock.clone()));
        IntelligentPreloader::new(
            PreloaderConfig::default(),
            metadata,
            Arc::new(Storage {
                fail_on: fail_on.map(str::to_string),
            }),
            network,
            cache,
            clock,
        )
    }

    #[tokio::test]
    async fn test_no_sample_means_unsuitable() {
        let preloader = preloader(None);
        let report = preloader.preload_intelligently(PreloadContext::new("cur")).await.unwrap();
        assert_eq!(report.skipped, Some(SkipReason::NetworkUnsuitable));
        assert!(preloader.cache().is_empty());
    }

    #[tokio::test]
    async fn test_low_battery_mobile_is_noop() {
        let preloader = preloader(None);
        let context = PreloadContext::new("cur")
            .with_network_speed(20.0)
            .with_device(DeviceType::Mobile, Some(5.0));
        let report = preloader.preload_intelligently(context).await.unwrap();
        assert_eq!(report.skipped, Some(SkipReason::LowBattery));
        assert!(preloader.cache().is_empty());
        assert_eq!(report.cache.entries, 0);
    }

    #[tokio::test]
    async fn test_preloads_top_candidates_for_high_tier() {
        let preloader = preloader(None);
        let context = PreloadContext::new("cur")
            .with_playlist(["cur", "p1", "p2"])
            .with_network_speed(20.0);
        let report = preloader.preload_intelligently(context).await.unwrap();

        assert!(report.skipped.is_none());
        assert_eq!(report.quality, "high");
        assert_eq!(report.strategy.max_concurrent, 3);
        assert_eq!(report.candidates.len(), 4);
        // Playlist neighbours score 25 and 20; related items 10
        assert_eq!(report.candidates[0].audio_id, "p1");
        assert_eq!(report.candidates[1].audio_id, "p2");
        assert_eq!(report.cached.len(), 3);

        let cache = preloader.cache();
        assert_eq!(cache.peek("p1", Some("high")).unwrap().len(), 256 * 1024);
        assert!(cache.total_bytes() <= cache.capacity_bytes());
    }

    #[tokio::test]
    async fn test_second_call_reports_already_cached() {
        let preloader = preloader(None);
        let context = PreloadContext::new("cur")
            .with_playlist(["cur", "p1"])
            .with_network_speed(3.0);
        let first = preloader.preload_intelligently(context.clone()).await.unwrap();
        assert_eq!(first.cached.len(), 2);

        let second = preloader.preload_intelligently(context).await.unwrap();
        assert!(second.cached.is_empty());
        assert_eq!(second.already_cached.len(), 2);
        assert!(second.generation > first.generation);
    }

    #[tokio::test]
    async fn test_failed_fetch_is_partial_success() {
        let preloader = preloader(Some("p1.mp3"));
        let context = PreloadContext::new("cur")
            .with_playlist(["cur", "p1", "p2"])
            .with_network_speed(20.0);
        let report = preloader.preload_intelligently(context).await.unwrap();

        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].audio_id, "p1");
        assert_eq!(report.cached.len(), 2);
        assert!(!preloader.cache().contains("p1", "high"));
        assert_eq!(preloader.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn test_gates() {
        let preloader = preloader(None);

        let mut opted_out = PreloadContext::new("cur").with_network_speed(20.0);
        opted_out.user_preferences.preload_enabled = false;
        let report = preloader.preload_intelligently(opted_out).await.unwrap();
        assert_eq!(report.skipped, Some(SkipReason::UserDisabled));

        let mut slow_client = PreloadContext::new("cur").with_network_speed(20.0);
        slow_client.network_quality = Some("2g".to_string());
        let report = preloader.preload_intelligently(slow_client).await.unwrap();
        assert_eq!(report.skipped, Some(SkipReason::ClientNetworkLow));

        assert!(preloader.cache().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_context_is_rejected() {
        let preloader = preloader(None);
        let err = preloader
            .preload_intelligently(PreloadContext::new(""))
            .await
            .unwrap_err();
        assert!(matches!(err, DeliveryError::InvalidContext(_)));
    }
}
