//! Tests for the intelligent preloader
//!
//! These tests drive the preloader end to end through in-memory catalog and
//! storage fakes and a mocked throughput probe.

use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::{
    AudioCatalog, AudioDescriptor, AudioFormat, AudioMetadata, AudioStorage, ManualClock, ProbeSample, RangeReader,
    ThroughputProbe,
};
use bytes::Bytes;
use chrono::{TimeZone, Utc};
use core_delivery::{
    DeviceType, IntelligentPreloader, MetadataCache, NetworkMonitor, NetworkMonitorConfig, NetworkQuality,
    PreloadCache, PreloadCacheConfig, PreloadContext, PreloaderConfig, SkipReason,
};
use core_runtime::events::{CoreEvent, EventBus, PreloadEvent};
use mockall::mock;
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Fakes
// ============================================================================

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

/// Storage that stalls on keys starting with "slow-" and lags on "lag-".
struct Storage;

#[async_trait]
impl AudioStorage for Storage {
    async fn read_range(&self, key: &str, _start: u64, len: u64) -> BridgeResult<Bytes> {
        if key.starts_with("slow-") {
            tokio::time::sleep(Duration::from_secs(60)).await;
        } else if key.starts_with("lag-") {
            tokio::time::sleep(Duration::from_secs(2)).await;
        }
        Ok(Bytes::from(vec![1u8; len as usize]))
    }

    async fn open_range(&self, _key: &str, _start: u64, _len: u64) -> BridgeResult<RangeReader> {
        Err(BridgeError::NotAvailable("streaming not used here".to_string()))
    }
}

mock! {
    Probe {}

    #[async_trait]
    impl ThroughputProbe for Probe {
        async fn probe(&self) -> BridgeResult<ProbeSample>;
    }
}

fn audio(id: &str, category: &str, file_size: u64) -> AudioDescriptor {
    AudioDescriptor {
        metadata: AudioMetadata {
            id: id.to_string(),
            file_size,
            duration: 120.0,
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

struct Harness {
    preloader: Arc<IntelligentPreloader>,
    cache: Arc<PreloadCache>,
    network: Arc<NetworkMonitor>,
    bus: Arc<EventBus>,
}

fn harness(items: Vec<AudioDescriptor>, capacity_bytes: u64, probe: Option<MockProbe>) -> Harness {
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()));
    let bus = Arc::new(EventBus::new(256));
    let metadata = Arc::new(MetadataCache::new(Arc::new(Catalog { items }), clock.clone()));

    let mut network = NetworkMonitor::new(NetworkMonitorConfig::default(), clock.clone());
    if let Some(probe) = probe {
        network = network.with_probe(Arc::new(probe));
    }
    let network = Arc::new(network);

    let cache = Arc::new(
        PreloadCache::new(PreloadCacheConfig::new().with_capacity_bytes(capacity_bytes), clock.clone())
            .with_event_bus(bus.clone()),
    );
    let preloader = Arc::new(
        IntelligentPreloader::new(
            PreloaderConfig::default(),
            metadata,
            Arc::new(Storage),
            network.clone(),
            cache.clone(),
            clock,
        )
        .with_event_bus(bus.clone()),
    );

    Harness {
        preloader,
        cache,
        network,
        bus,
    }
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn test_low_battery_mobile_leaves_cache_unchanged() {
    let h = harness(
        vec![audio("cur", "talk", 10_000), audio("next", "talk", 10_000)],
        1024 * 1024,
        None,
    );
    h.cache.insert("seed", "medium", Bytes::from_static(b"seed-bytes"));
    let before = h.cache.entries();
    let mut events = h.bus.subscribe();

    let context = PreloadContext::new("cur")
        .with_playlist(["cur", "next"])
        .with_network_speed(50.0)
        .with_device(DeviceType::Mobile, Some(5.0));
    let report = h.preloader.preload_intelligently(context).await.unwrap();

    assert_eq!(report.skipped, Some(SkipReason::LowBattery));
    assert!(report.cached.is_empty());
    assert_eq!(h.cache.entries(), before);

    match events.try_recv() {
        Ok(CoreEvent::Preload(PreloadEvent::Skipped { reason })) => assert!(reason.contains("Battery")),
        other => panic!("expected a skip event, got {other:?}"),
    }
}

#[tokio::test]
async fn test_slow_probe_result_disables_preloading() {
    let mut probe = MockProbe::new();
    // 62.5 kB in one second is 0.5 Mbps
    probe
        .expect_probe()
        .times(1)
        .returning(|| Ok(ProbeSample::new(62_500, Duration::from_secs(1))));

    let h = harness(vec![audio("cur", "talk", 10_000)], 1024 * 1024, Some(probe));
    let metrics = h.network.perform_network_test().await;

    assert_eq!(metrics.quality, NetworkQuality::Low);
    assert!(!h.network.is_suitable_for_preloading());
    assert_eq!(h.network.recommended_preload_strategy().max_concurrent, 1);

    let report = h
        .preloader
        .preload_intelligently(PreloadContext::new("cur"))
        .await
        .unwrap();
    assert_eq!(report.skipped, Some(SkipReason::NetworkUnsuitable));
}

#[tokio::test]
async fn test_failed_probe_keeps_previous_estimate() {
    let mut probe = MockProbe::new();
    probe
        .expect_probe()
        .returning(|| Err(BridgeError::OperationFailed("unreachable".to_string())));

    let h = harness(vec![audio("cur", "talk", 10_000)], 1024 * 1024, Some(probe));
    h.network.record_sample(8.0, core_delivery::SampleSource::Client);

    let metrics = h.network.perform_network_test().await;
    assert_eq!(metrics.quality, NetworkQuality::High);
    assert_eq!(metrics.speed_mbps, 8.0);
}

#[tokio::test(start_paused = true)]
async fn test_superseded_fetch_is_cancelled_and_not_admitted() {
    let h = harness(
        vec![
            audio("a", "history", 500_000),
            audio("slow-x", "cooking", 500_000),
            audio("b", "science", 500_000),
            audio("y", "music", 500_000),
        ],
        8 * 1024 * 1024,
        None,
    );

    let first = {
        let preloader = h.preloader.clone();
        tokio::spawn(async move {
            let context = PreloadContext::new("a")
                .with_playlist(["a", "slow-x"])
                .with_network_speed(3.0);
            preloader.preload_intelligently(context).await
        })
    };

    // Let the first call register its fetch and stall in storage
    while h.preloader.in_flight_count() == 0 {
        tokio::task::yield_now().await;
    }

    let second = h
        .preloader
        .preload_intelligently(PreloadContext::new("b").with_playlist(["b", "y"]))
        .await
        .unwrap();
    assert!(second.cancelled.contains(&"slow-x".to_string()));
    assert_eq!(second.cached, vec!["y".to_string()]);

    let first = first.await.unwrap().unwrap();
    assert!(first.cancelled.contains(&"slow-x".to_string()));
    assert!(first.cached.is_empty());

    assert!(!h.cache.contains("slow-x", "medium"));
    assert!(h.cache.contains("y", "medium"));
    assert_eq!(h.preloader.in_flight_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_abandoned_call_releases_in_flight_slots() {
    let h = harness(
        vec![audio("a", "history", 500_000), audio("slow-x", "cooking", 500_000)],
        8 * 1024 * 1024,
        None,
    );
    let context = || {
        PreloadContext::new("a")
            .with_playlist(["a", "slow-x"])
            .with_network_speed(3.0)
    };

    let abandoned = tokio::time::timeout(Duration::from_secs(1), h.preloader.preload_intelligently(context())).await;
    assert!(abandoned.is_err());
    assert_eq!(h.preloader.in_flight_count(), 0);

    tokio::time::advance(Duration::from_secs(600)).await;

    // The next call fetches again instead of waiting on a dead registration
    let report = h.preloader.preload_intelligently(context()).await.unwrap();
    assert!(report.in_flight.is_empty());
    assert!(report.failed.iter().any(|f| f.audio_id == "slow-x"));
    assert_eq!(h.preloader.in_flight_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_listener_on_same_track_keeps_other_fetches() {
    let h = harness(
        vec![audio("a", "history", 500_000), audio("lag-x", "cooking", 500_000)],
        8 * 1024 * 1024,
        None,
    );

    let first = {
        let preloader = h.preloader.clone();
        tokio::spawn(async move {
            let context = PreloadContext::new("a")
                .with_user("u1")
                .with_playlist(["a", "lag-x"])
                .with_network_speed(3.0);
            preloader.preload_intelligently(context).await
        })
    };

    while h.preloader.in_flight_count() == 0 {
        tokio::task::yield_now().await;
    }

    let second = h
        .preloader
        .preload_intelligently(PreloadContext::new("a").with_user("u2"))
        .await
        .unwrap();
    assert!(second.cancelled.is_empty());
    assert_eq!(h.preloader.in_flight_count(), 1);

    let first = first.await.unwrap().unwrap();
    assert!(first.cancelled.is_empty());
    assert_eq!(first.cached, vec!["lag-x".to_string()]);
    assert!(h.cache.contains("lag-x", "medium"));
    assert_eq!(h.preloader.in_flight_count(), 0);
}

#[tokio::test]
async fn test_small_cache_stays_within_capacity() {
    let items: Vec<AudioDescriptor> = (0..12)
        .map(|i| audio(&format!("t{i}"), if i % 2 == 0 { "even" } else { "odd" }, 300 * 1024))
        .collect();
    let playlist: Vec<String> = items.iter().map(|d| d.id().to_string()).collect();
    // Room for two high-tier chunks
    let capacity = 2 * 256 * 1024 + 1000;
    let h = harness(items, capacity, None);

    for i in 0..10 {
        let context = PreloadContext::new(format!("t{i}"))
            .with_playlist(playlist.clone())
            .with_network_speed(20.0);
        let report = h.preloader.preload_intelligently(context).await.unwrap();
        assert!(report.skipped.is_none());
        assert!(h.cache.total_bytes() <= capacity);

        h.preloader.record_access(&format!("t{}", i + 1));
    }

    let stats = h.cache.stats();
    assert!(stats.evictions > 0);
    assert!(stats.hits > 0);
    assert!(stats.entries <= 2);
}
