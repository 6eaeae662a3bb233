//! # Network Monitor
//!
//! Maintains a rolling estimate of delivery throughput and classifies it into
//! a quality tier.
//!
//! ## Overview
//!
//! Samples come from two places:
//! - an explicit `perform_network_test()` that runs the injected
//!   [`ThroughputProbe`] under a timeout
//! - speed hints reported by clients (`record_sample` with
//!   [`SampleSource::Client`])
//!
//! The estimate is the mean of the last `window` samples. Reading it never
//! blocks; before the first sample it is a conservative `medium` default.
//! A probe failure leaves the last estimate untouched.

use bridge_traits::{Clock, ThroughputProbe};
use chrono::{DateTime, Utc};
use core_runtime::config::NetworkSettings;
use core_runtime::events::{CoreEvent, EventBus, NetworkEvent};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Network quality tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkQuality {
    Low,
    Medium,
    High,
}

impl NetworkQuality {
    /// Classify a speed. Monotonic in `speed_mbps` for fixed thresholds.
    pub fn classify(speed_mbps: f64, low_threshold_mbps: f64, high_threshold_mbps: f64) -> Self {
        if speed_mbps >= high_threshold_mbps {
            NetworkQuality::High
        } else if speed_mbps >= low_threshold_mbps {
            NetworkQuality::Medium
        } else {
            NetworkQuality::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NetworkQuality::Low => "low",
            NetworkQuality::Medium => "medium",
            NetworkQuality::High => "high",
        }
    }

    /// Lenient parse used for client-supplied hints.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" | "slow" | "2g" | "slow-2g" => Some(NetworkQuality::Low),
            "medium" | "3g" => Some(NetworkQuality::Medium),
            "high" | "fast" | "4g" | "5g" | "wifi" => Some(NetworkQuality::High),
            _ => None,
        }
    }
}

impl fmt::Display for NetworkQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a sample came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleSource {
    Probe,
    Client,
}

/// Current network estimate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkMetrics {
    pub speed_mbps: f64,
    pub quality: NetworkQuality,
    /// `None` until the first sample arrives
    pub measured_at: Option<DateTime<Utc>>,
    pub sample_count: usize,
}

impl NetworkMetrics {
    pub fn is_measured(&self) -> bool {
        self.measured_at.is_some()
    }
}

/// Concurrency and chunk size for preload fetches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreloadStrategy {
    pub max_concurrent: usize,
    pub chunk_size: usize,
}

impl PreloadStrategy {
    pub fn for_quality(quality: NetworkQuality) -> Self {
        match quality {
            NetworkQuality::High => Self {
                max_concurrent: 3,
                chunk_size: 256 * 1024,
            },
            NetworkQuality::Medium => Self {
                max_concurrent: 2,
                chunk_size: 128 * 1024,
            },
            NetworkQuality::Low => Self {
                max_concurrent: 1,
                chunk_size: 64 * 1024,
            },
        }
    }
}

/// Monitor tuning.
#[derive(Debug, Clone)]
pub struct NetworkMonitorConfig {
    pub high_threshold_mbps: f64,
    pub low_threshold_mbps: f64,
    /// Samples older than this no longer justify preloading
    pub stale_after: Duration,
    pub probe_timeout: Duration,
    /// Number of samples averaged
    pub window: usize,
}

impl Default for NetworkMonitorConfig {
    fn default() -> Self {
        Self::from(&NetworkSettings::default())
    }
}

impl From<&NetworkSettings> for NetworkMonitorConfig {
    fn from(settings: &NetworkSettings) -> Self {
        Self {
            high_threshold_mbps: settings.high_threshold_mbps,
            low_threshold_mbps: settings.low_threshold_mbps,
            stale_after: settings.sample_stale_after,
            probe_timeout: settings.probe_timeout,
            window: 5,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Sample {
    speed_mbps: f64,
    at: DateTime<Utc>,
}

#[derive(Default)]
struct MonitorState {
    samples: VecDeque<Sample>,
    current: Option<NetworkMetrics>,
}

/// Rolling network quality estimate.
pub struct NetworkMonitor {
    config: NetworkMonitorConfig,
    probe: Option<Arc<dyn ThroughputProbe>>,
    clock: Arc<dyn Clock>,
    state: RwLock<MonitorState>,
    probe_gate: tokio::sync::Mutex<()>,
    event_bus: Option<Arc<EventBus>>,
}

impl NetworkMonitor {
    pub fn new(config: NetworkMonitorConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            probe: None,
            clock,
            state: RwLock::new(MonitorState::default()),
            probe_gate: tokio::sync::Mutex::new(()),
            event_bus: None,
        }
    }

    pub fn with_probe(mut self, probe: Arc<dyn ThroughputProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Set event bus for quality change and probe failure events.
    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn has_probe(&self) -> bool {
        self.probe.is_some()
    }

    fn emit(&self, event: NetworkEvent) {
        if let Some(bus) = &self.event_bus {
            bus.emit(CoreEvent::Network(event)).ok();
        }
    }

    fn default_metrics(&self) -> NetworkMetrics {
        let speed = (self.config.low_threshold_mbps + self.config.high_threshold_mbps) / 2.0;
        NetworkMetrics {
            speed_mbps: speed,
            quality: NetworkQuality::Medium,
            measured_at: None,
            sample_count: 0,
        }
    }

    /// Classify a speed with this monitor's thresholds.
    pub fn classify(&self, speed_mbps: f64) -> NetworkQuality {
        NetworkQuality::classify(
            speed_mbps,
            self.config.low_threshold_mbps,
            self.config.high_threshold_mbps,
        )
    }

    /// Latest estimate; a `medium` default before any sample.
    pub fn current_metrics(&self) -> NetworkMetrics {
        self.state
            .read()
            .current
            .clone()
            .unwrap_or_else(|| self.default_metrics())
    }

    /// Fold a new speed sample into the rolling estimate.
    ///
    /// Non-finite or negative speeds are ignored.
    pub fn record_sample(&self, speed_mbps: f64, source: SampleSource) -> NetworkMetrics {
        if !speed_mbps.is_finite() || speed_mbps < 0.0 {
            debug!(speed_mbps, ?source, "Ignoring invalid speed sample");
            return self.current_metrics();
        }

        let now = self.clock.now();
        let window = self.config.window.max(1);

        let (previous, metrics) = {
            let mut state = self.state.write();
            state.samples.push_back(Sample { speed_mbps, at: now });
            while state.samples.len() > window {
                state.samples.pop_front();
            }

            let mean = state.samples.iter().map(|s| s.speed_mbps).sum::<f64>()
                / state.samples.len() as f64;
            let measured_at = state.samples.iter().map(|s| s.at).max();

            let metrics = NetworkMetrics {
                speed_mbps: mean,
                quality: self.classify(mean),
                measured_at,
                sample_count: state.samples.len(),
            };
            let previous = state.current.replace(metrics.clone());
            (previous, metrics)
        };

        let previous_quality = previous.map_or(NetworkQuality::Medium, |m| m.quality);
        debug!(speed_mbps, ?source, estimate = metrics.speed_mbps, "Network sample recorded");

        if previous_quality != metrics.quality {
            info!(
                from = %previous_quality,
                to = %metrics.quality,
                speed_mbps = metrics.speed_mbps,
                "Network quality changed"
            );
            self.emit(NetworkEvent::QualityChanged {
                previous: previous_quality.to_string(),
                current: metrics.quality.to_string(),
                speed_mbps: metrics.speed_mbps,
            });
        }

        metrics
    }

    /// True when there is no sample or the newest one is older than `stale_after`.
    pub fn is_stale(&self) -> bool {
        match self.state.read().current.as_ref().and_then(|m| m.measured_at) {
            None => true,
            Some(at) => {
                let age = self.clock.now().signed_duration_since(at);
                age.to_std().map_or(false, |age| age > self.config.stale_after)
            }
        }
    }

    /// Preloading is worthwhile only on a fresh, non-low estimate.
    pub fn is_suitable_for_preloading(&self) -> bool {
        !self.is_stale() && self.current_metrics().quality != NetworkQuality::Low
    }

    /// Preload concurrency and chunk size for the current tier.
    pub fn recommended_preload_strategy(&self) -> PreloadStrategy {
        PreloadStrategy::for_quality(self.current_metrics().quality)
    }

    /// Run the probe and fold the result into the estimate.
    ///
    /// Concurrent callers share one probe: a caller that finds a probe
    /// already running waits for it and returns its result. Failure or
    /// timeout returns the last-known metrics.
    #[instrument(skip(self))]
    pub async fn perform_network_test(&self) -> NetworkMetrics {
        let Some(probe) = self.probe.clone() else {
            debug!("No throughput probe configured");
            return self.current_metrics();
        };

        let _guard = match self.probe_gate.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                let _wait = self.probe_gate.lock().await;
                return self.current_metrics();
            }
        };

        let failure = match tokio::time::timeout(self.config.probe_timeout, probe.probe()).await {
            Ok(Ok(sample)) => match sample.megabits_per_second() {
                Some(speed) => return self.record_sample(speed, SampleSource::Probe),
                None => "probe returned an empty sample".to_string(),
            },
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!("probe timed out after {:?}", self.config.probe_timeout),
        };

        warn!(error = %failure, "Network probe failed; keeping last estimate");
        self.emit(NetworkEvent::ProbeFailed { message: failure });
        self.current_metrics()
    }

    /// Probe every `interval` until `token` is cancelled.
    pub fn spawn_refresh(self: &Arc<Self>, interval: Duration, token: CancellationToken) -> JoinHandle<()> {
        let monitor = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        debug!("Network refresh loop stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        monitor.perform_network_test().await;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::{BridgeError, Result as BridgeResult};
    use bridge_traits::{ManualClock, ProbeSample};
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()))
    }

    fn monitor(clock: Arc<ManualClock>) -> NetworkMonitor {
        NetworkMonitor::new(NetworkMonitorConfig::default(), clock)
    }

    struct SlowProbe {
        calls: AtomicUsize,
        delay: Duration,
    }

    #[async_trait]
    impl ThroughputProbe for SlowProbe {
        async fn probe(&self) -> BridgeResult<ProbeSample> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            // 1 MB in one second = 8 Mbps
            Ok(ProbeSample::new(1_000_000, Duration::from_secs(1)))
        }
    }

    struct FailingProbe;

    #[async_trait]
    impl ThroughputProbe for FailingProbe {
        async fn probe(&self) -> BridgeResult<ProbeSample> {
            Err(BridgeError::OperationFailed("connection reset".to_string()))
        }
    }

    #[test]
    fn test_classification_is_monotonic() {
        let speeds = [0.0, 0.5, 0.99, 1.0, 2.5, 4.99, 5.0, 50.0];
        let tiers: Vec<NetworkQuality> = speeds
            .iter()
            .map(|s| NetworkQuality::classify(*s, 1.0, 5.0))
            .collect();
        assert!(tiers.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(tiers[0], NetworkQuality::Low);
        assert_eq!(tiers[3], NetworkQuality::Medium);
        assert_eq!(tiers[6], NetworkQuality::High);
    }

    #[test]
    fn test_default_before_any_sample() {
        let monitor = monitor(clock());
        let metrics = monitor.current_metrics();
        assert_eq!(metrics.quality, NetworkQuality::Medium);
        assert!(!metrics.is_measured());
        assert!(!monitor.is_suitable_for_preloading());
    }

    #[test]
    fn test_slow_network_disables_preloading() {
        let monitor = monitor(clock());
        let metrics = monitor.record_sample(0.5, SampleSource::Client);
        assert_eq!(metrics.quality, NetworkQuality::Low);
        assert!(!monitor.is_suitable_for_preloading());
        assert_eq!(monitor.recommended_preload_strategy().max_concurrent, 1);
        assert_eq!(monitor.recommended_preload_strategy().chunk_size, 64 * 1024);
    }

    #[test]
    fn test_rolling_mean_over_window() {
        let monitor = monitor(clock());
        for _ in 0..5 {
            monitor.record_sample(10.0, SampleSource::Probe);
        }
        assert_eq!(monitor.current_metrics().quality, NetworkQuality::High);

        // Two slow samples pull the mean of the last five to 6.8 Mbps
        monitor.record_sample(2.0, SampleSource::Client);
        let metrics = monitor.record_sample(2.0, SampleSource::Client);
        assert!((metrics.speed_mbps - 6.8).abs() < 1e-9);
        assert_eq!(metrics.sample_count, 5);

        for _ in 0..3 {
            monitor.record_sample(0.1, SampleSource::Client);
        }
        assert_eq!(monitor.current_metrics().quality, NetworkQuality::Low);
    }

    #[test]
    fn test_invalid_samples_ignored() {
        let monitor = monitor(clock());
        monitor.record_sample(f64::NAN, SampleSource::Client);
        monitor.record_sample(-3.0, SampleSource::Client);
        assert!(!monitor.current_metrics().is_measured());
    }

    #[test]
    fn test_stale_sample_is_unsuitable() {
        let clock = clock();
        let monitor = monitor(clock.clone());
        monitor.record_sample(20.0, SampleSource::Probe);
        assert!(monitor.is_suitable_for_preloading());

        clock.advance(chrono::Duration::minutes(6));
        assert!(monitor.is_stale());
        assert!(!monitor.is_suitable_for_preloading());
    }

    #[test]
    fn test_strategy_table() {
        assert_eq!(
            PreloadStrategy::for_quality(NetworkQuality::High),
            PreloadStrategy {
                max_concurrent: 3,
                chunk_size: 262_144
            }
        );
        assert_eq!(PreloadStrategy::for_quality(NetworkQuality::Medium).max_concurrent, 2);
    }

    #[tokio::test]
    async fn test_probe_updates_estimate() {
        let probe = Arc::new(SlowProbe {
            calls: AtomicUsize::new(0),
            delay: Duration::from_millis(1),
        });
        let monitor = monitor(clock()).with_probe(probe);
        let metrics = monitor.perform_network_test().await;
        assert!((metrics.speed_mbps - 8.0).abs() < 1e-9);
        assert_eq!(metrics.quality, NetworkQuality::High);
    }

    #[tokio::test]
    async fn test_probe_failure_keeps_last_estimate() {
        let bus = Arc::new(EventBus::new(8));
        let mut rx = bus.subscribe();
        let monitor = monitor(clock())
            .with_probe(Arc::new(FailingProbe))
            .with_event_bus(bus);

        monitor.record_sample(3.0, SampleSource::Client);
        let before = monitor.current_metrics();
        let after = monitor.perform_network_test().await;
        assert_eq!(before, after);

        assert!(matches!(
            rx.recv().await.unwrap(),
            CoreEvent::Network(NetworkEvent::ProbeFailed { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_timeout_falls_back() {
        let probe = Arc::new(SlowProbe {
            calls: AtomicUsize::new(0),
            delay: Duration::from_secs(60),
        });
        let monitor = monitor(clock()).with_probe(probe);
        let metrics = monitor.perform_network_test().await;
        assert!(!metrics.is_measured());
        assert_eq!(metrics.quality, NetworkQuality::Medium);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_tests_share_one_probe() {
        let probe = Arc::new(SlowProbe {
            calls: AtomicUsize::new(0),
            delay: Duration::from_millis(500),
        });
        let monitor = Arc::new(monitor(clock()).with_probe(probe.clone()));

        let (a, b) = tokio::join!(monitor.perform_network_test(), monitor.perform_network_test());
        assert_eq!(probe.calls.load(Ordering::SeqCst), 1);
        assert_eq!(a, b);
    }

    #[test]
    fn test_hint_parsing() {
        assert_eq!(NetworkQuality::parse("4G"), Some(NetworkQuality::High));
        assert_eq!(NetworkQuality::parse("slow-2g"), Some(NetworkQuality::Low));
        assert_eq!(NetworkQuality::parse("carrier pigeon"), None);
    }
}
