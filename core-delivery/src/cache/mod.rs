//! # Preload Cache Module
//!
//! Bounded in-memory store for the leading chunk of tracks the preloader
//! expects to be played next.
//!
//! ## Overview
//!
//! - Entries are keyed by `(audio_id, quality)`
//! - Total size never exceeds the configured capacity
//! - Admission evicts least-recently-used entries first; ties go to the
//!   entry with the fewest accesses
//! - `record_access` is the only source of hit/miss statistics
//! - All mutation happens under a single lock
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────┐  insert   ┌────────────────────────┐
//! │ IntelligentPreloader ├──────────>│      PreloadCache      │
//! └──────────────────────┘           │  - insert()            │
//! ┌──────────────────────┐  peek /   │  - record_access()     │
//! │   Stream handler     ├──────────>│  - clear_all()         │
//! └──────────────────────┘  access   └────────────────────────┘
//! ```

pub mod config;
pub mod stats;

pub use config::PreloadCacheConfig;
pub use stats::PreloadCacheStats;

use bridge_traits::Clock;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use core_runtime::events::{CoreEvent, EventBus, PreloadEvent};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// One cached chunk.
#[derive(Debug, Clone)]
pub struct PreloadCacheEntry {
    pub audio_id: String,
    pub quality: String,
    /// Leading bytes of the file, starting at offset 0
    pub bytes: Bytes,
    pub fetched_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    pub access_count: u64,
    pub size_bytes: u64,
}

/// Entry description without the payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedEntrySummary {
    pub audio_id: String,
    pub quality: String,
    pub size_bytes: u64,
    pub access_count: u64,
    pub fetched_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
}

impl From<&PreloadCacheEntry> for CachedEntrySummary {
    fn from(entry: &PreloadCacheEntry) -> Self {
        Self {
            audio_id: entry.audio_id.clone(),
            quality: entry.quality.clone(),
            size_bytes: entry.size_bytes,
            access_count: entry.access_count,
            fetched_at: entry.fetched_at,
            last_accessed_at: entry.last_accessed_at,
        }
    }
}

/// Result of an admission attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// Stored; lists the entries evicted to make room
    Admitted { evicted: Vec<CachedEntrySummary> },
    /// Empty payload or larger than the whole cache
    Rejected,
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admitted { .. })
    }
}

type EntryKey = (String, String);

struct Slot {
    entry: PreloadCacheEntry,
    /// Monotonic touch order, breaks timestamp ties deterministically
    touched: u64,
}

#[derive(Default)]
struct CacheState {
    slots: HashMap<EntryKey, Slot>,
    total_bytes: u64,
    tick: u64,
    hits: u64,
    misses: u64,
    admissions: u64,
    evictions: u64,
    rejected: u64,
}

impl CacheState {
    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    fn remove(&mut self, key: &EntryKey) -> Option<PreloadCacheEntry> {
        let slot = self.slots.remove(key)?;
        self.total_bytes -= slot.entry.size_bytes;
        Some(slot.entry)
    }

    /// Least recently accessed, then fewest accesses, then oldest touch.
    fn eviction_victim(&self) -> Option<EntryKey> {
        self.slots
            .iter()
            .min_by(|(_, a), (_, b)| {
                a.entry
                    .last_accessed_at
                    .cmp(&b.entry.last_accessed_at)
                    .then_with(|| a.entry.access_count.cmp(&b.entry.access_count))
                    .then_with(|| a.touched.cmp(&b.touched))
            })
            .map(|(key, _)| key.clone())
    }
}

/// Bounded, eviction-capable store of preloaded chunks.
pub struct PreloadCache {
    config: PreloadCacheConfig,
    clock: Arc<dyn Clock>,
    state: Mutex<CacheState>,
    event_bus: Option<Arc<EventBus>>,
}

impl PreloadCache {
    pub fn new(config: PreloadCacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            state: Mutex::new(CacheState::default()),
            event_bus: None,
        }
    }

    /// Set event bus for admission and eviction events.
    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn capacity_bytes(&self) -> u64 {
        self.config.capacity_bytes
    }

    fn emit(&self, event: PreloadEvent) {
        if let Some(bus) = &self.event_bus {
            bus.emit(CoreEvent::Preload(event)).ok();
        }
    }

    /// Admit a chunk, evicting as needed.
    ///
    /// An existing entry for the same key is replaced.
    pub fn insert(&self, audio_id: &str, quality: &str, bytes: Bytes) -> Admission {
        let size = bytes.len() as u64;
        let capacity = self.config.capacity_bytes;

        if size == 0 || size > capacity {
            self.state.lock().rejected += 1;
            debug!(audio_id, size, capacity, "Preload chunk rejected");
            return Admission::Rejected;
        }

        let now = self.clock.now();
        let key: EntryKey = (audio_id.to_string(), quality.to_string());
        let mut evicted = Vec::new();

        {
            let mut state = self.state.lock();
            state.remove(&key);

            while state.total_bytes + size > capacity {
                let Some(victim) = state.eviction_victim() else {
                    break;
                };
                if let Some(entry) = state.remove(&victim) {
                    state.evictions += 1;
                    evicted.push(CachedEntrySummary::from(&entry));
                }
            }

            let touched = state.next_tick();
            state.total_bytes += size;
            state.admissions += 1;
            state.slots.insert(
                key,
                Slot {
                    entry: PreloadCacheEntry {
                        audio_id: audio_id.to_string(),
                        quality: quality.to_string(),
                        bytes,
                        fetched_at: now,
                        last_accessed_at: now,
                        access_count: 0,
                        size_bytes: size,
                    },
                    touched,
                },
            );
        }

        for entry in &evicted {
            debug!(audio_id = %entry.audio_id, size = entry.size_bytes, "Evicted preload entry");
            self.emit(PreloadEvent::Evicted {
                audio_id: entry.audio_id.clone(),
                quality: entry.quality.clone(),
                size_bytes: entry.size_bytes,
            });
        }
        self.emit(PreloadEvent::Cached {
            audio_id: audio_id.to_string(),
            quality: quality.to_string(),
            size_bytes: size,
        });

        Admission::Admitted { evicted }
    }

    /// Playback consumed `audio_id`: bump recency and count for every cached
    /// quality of it and record a hit, or record a miss.
    ///
    /// Returns whether anything was cached.
    pub fn record_access(&self, audio_id: &str) -> bool {
        let now = self.clock.now();
        let mut state = self.state.lock();
        let keys: Vec<EntryKey> = state
            .slots
            .keys()
            .filter(|(id, _)| id == audio_id)
            .cloned()
            .collect();

        if keys.is_empty() {
            state.misses += 1;
            return false;
        }

        for key in keys {
            let touched = state.next_tick();
            if let Some(slot) = state.slots.get_mut(&key) {
                slot.entry.last_accessed_at = now;
                slot.entry.access_count += 1;
                slot.touched = touched;
            }
        }
        state.hits += 1;
        true
    }

    /// Read a cached chunk without counting an access.
    ///
    /// With `quality` unset, the largest cached chunk of the track is returned.
    pub fn peek(&self, audio_id: &str, quality: Option<&str>) -> Option<Bytes> {
        let state = self.state.lock();
        match quality {
            Some(quality) => state
                .slots
                .get(&(audio_id.to_string(), quality.to_string()))
                .map(|slot| slot.entry.bytes.clone()),
            None => state
                .slots
                .values()
                .filter(|slot| slot.entry.audio_id == audio_id)
                .max_by_key(|slot| slot.entry.size_bytes)
                .map(|slot| slot.entry.bytes.clone()),
        }
    }

    pub fn contains(&self, audio_id: &str, quality: &str) -> bool {
        self.state
            .lock()
            .slots
            .contains_key(&(audio_id.to_string(), quality.to_string()))
    }

    /// Drop every entry and reset statistics. Returns the number of entries removed.
    pub fn clear_all(&self) -> usize {
        let removed = {
            let mut state = self.state.lock();
            let removed = state.slots.len();
            *state = CacheState::default();
            removed
        };
        info!(entries = removed, "Preload cache cleared");
        self.emit(PreloadEvent::Cleared { entries: removed });
        removed
    }

    pub fn stats(&self) -> PreloadCacheStats {
        let state = self.state.lock();
        PreloadCacheStats {
            entries: state.slots.len(),
            total_bytes: state.total_bytes,
            capacity_bytes: self.config.capacity_bytes,
            hits: state.hits,
            misses: state.misses,
            hit_rate: PreloadCacheStats::compute_hit_rate(state.hits, state.misses),
            admissions: state.admissions,
            evictions: state.evictions,
            rejected: state.rejected,
        }
    }

    /// Entries, most recently accessed first.
    pub fn entries(&self) -> Vec<CachedEntrySummary> {
        let state = self.state.lock();
        let mut slots: Vec<&Slot> = state.slots.values().collect();
        slots.sort_by(|a, b| b.touched.cmp(&a.touched));
        slots.into_iter().map(|s| CachedEntrySummary::from(&s.entry)).collect()
    }

    pub fn total_bytes(&self) -> u64 {
        self.state.lock().total_bytes
    }

    pub fn len(&self) -> usize {
        self.state.lock().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::ManualClock;
    use chrono::TimeZone;

    fn setup(capacity: u64) -> (PreloadCache, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()));
        let cache = PreloadCache::new(
            PreloadCacheConfig::new().with_capacity_bytes(capacity),
            clock.clone(),
        );
        (cache, clock)
    }

    fn chunk(len: usize) -> Bytes {
        Bytes::from(vec![7u8; len])
    }

    #[test]
    fn test_admission_within_capacity() {
        let (cache, _) = setup(100);
        assert!(cache.insert("a", "medium", chunk(40)).is_admitted());
        assert!(cache.insert("b", "medium", chunk(40)).is_admitted());
        assert_eq!(cache.total_bytes(), 80);
        assert_eq!(cache.len(), 2);
        assert!(cache.contains("a", "medium"));
        assert!(!cache.contains("a", "high"));
    }

    #[test]
    fn test_evicts_least_recently_accessed() {
        let (cache, clock) = setup(100);
        cache.insert("a", "medium", chunk(40));
        clock.advance(chrono::Duration::seconds(1));
        cache.insert("b", "medium", chunk(40));
        clock.advance(chrono::Duration::seconds(1));
        cache.record_access("a");

        let admission = cache.insert("c", "medium", chunk(40));
        match admission {
            Admission::Admitted { evicted } => {
                assert_eq!(evicted.len(), 1);
                assert_eq!(evicted[0].audio_id, "b");
            }
            Admission::Rejected => panic!("should be admitted"),
        }
        assert!(cache.total_bytes() <= 100);
        assert!(cache.contains("a", "medium"));
    }

    #[test]
    fn test_timestamp_ties_break_on_access_count() {
        let (cache, _) = setup(100);
        cache.insert("a", "medium", chunk(50));
        cache.insert("b", "medium", chunk(50));
        // Same instant for both; "b" gets more accesses
        cache.record_access("b");
        cache.record_access("b");
        cache.record_access("a");

        cache.insert("c", "medium", chunk(50));
        assert!(!cache.contains("a", "medium"));
        assert!(cache.contains("b", "medium"));
    }

    #[test]
    fn test_oversized_and_empty_rejected() {
        let (cache, _) = setup(100);
        assert_eq!(cache.insert("huge", "high", chunk(101)), Admission::Rejected);
        assert_eq!(cache.insert("none", "high", Bytes::new()), Admission::Rejected);
        assert!(cache.is_empty());
        assert_eq!(cache.stats().rejected, 2);
    }

    #[test]
    fn test_replacing_same_key_does_not_double_count() {
        let (cache, _) = setup(100);
        cache.insert("a", "medium", chunk(60));
        cache.insert("a", "medium", chunk(70));
        assert_eq!(cache.total_bytes(), 70);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_capacity_never_exceeded() {
        let (cache, clock) = setup(1000);
        for i in 0..200u64 {
            let size = (i * 37 % 400 + 1) as usize;
            cache.insert(&format!("t{}", i % 23), if i % 2 == 0 { "low" } else { "high" }, chunk(size));
            if i % 5 == 0 {
                cache.record_access(&format!("t{}", i % 7));
            }
            clock.advance(chrono::Duration::milliseconds(10));
            assert!(cache.total_bytes() <= 1000);
            let summed: u64 = cache.entries().iter().map(|e| e.size_bytes).sum();
            assert_eq!(summed, cache.total_bytes());
        }
    }

    #[test]
    fn test_hit_rate_and_clear() {
        let (cache, _) = setup(100);
        cache.insert("a", "medium", chunk(10));
        assert!(cache.record_access("a"));
        assert!(!cache.record_access("zzz"));

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hit_rate, 0.5);

        assert_eq!(cache.clear_all(), 1);
        let cleared = cache.stats();
        assert_eq!(cleared.entries, 0);
        assert_eq!(cleared.hits, 0);
        assert_eq!(cleared.total_bytes, 0);
        assert_eq!(cleared.capacity_bytes, 100);
    }

    #[test]
    fn test_peek_does_not_count_access() {
        let (cache, _) = setup(100);
        cache.insert("a", "low", chunk(10));
        cache.insert("a", "high", chunk(30));
        assert_eq!(cache.peek("a", None).unwrap().len(), 30);
        assert_eq!(cache.peek("a", Some("low")).unwrap().len(), 10);
        assert!(cache.peek("b", None).is_none());
        assert_eq!(cache.stats().hits, 0);
        assert_eq!(cache.entries()[0].access_count, 0);
    }

    #[tokio::test]
    async fn test_emits_events() {
        let bus = Arc::new(EventBus::new(16));
        let mut rx = bus.subscribe();
        let (cache, _) = setup(10);
        let cache = cache.with_event_bus(bus);

        cache.insert("a", "low", chunk(10));
        cache.insert("b", "low", chunk(10));

        let mut seen = Vec::new();
        while let Ok(event) = rx.try_recv() {
            seen.push(event.description().to_string());
        }
        assert_eq!(
            seen,
            vec!["Preloaded chunk cached", "Preloaded chunk evicted", "Preloaded chunk cached"]
        );
    }
}
