//! Short-lived metadata cache in front of the catalog.
//!
//! Stream requests for the same track arrive in bursts (one per range), so
//! descriptors are kept in an LRU for a few seconds. Unknown ids are not
//! cached.

use crate::error::{DeliveryError, Result};
use bridge_traits::{AudioCatalog, AudioDescriptor, Clock};
use chrono::{DateTime, Utc};
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

pub const DEFAULT_METADATA_TTL: Duration = Duration::from_secs(60);
pub const DEFAULT_METADATA_CAPACITY: usize = 1024;

struct CachedDescriptor {
    descriptor: AudioDescriptor,
    fetched_at: DateTime<Utc>,
}

pub struct MetadataCache {
    catalog: Arc<dyn AudioCatalog>,
    clock: Arc<dyn Clock>,
    ttl: chrono::Duration,
    entries: Mutex<LruCache<String, CachedDescriptor>>,
}

impl MetadataCache {
    pub fn new(catalog: Arc<dyn AudioCatalog>, clock: Arc<dyn Clock>) -> Self {
        Self::with_limits(catalog, clock, DEFAULT_METADATA_CAPACITY, DEFAULT_METADATA_TTL)
    }

    pub fn with_limits(
        catalog: Arc<dyn AudioCatalog>,
        clock: Arc<dyn Clock>,
        capacity: usize,
        ttl: Duration,
    ) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            catalog,
            clock,
            ttl: chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::seconds(60)),
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// The underlying catalog, for queries that are not cached.
    pub fn catalog(&self) -> &Arc<dyn AudioCatalog> {
        &self.catalog
    }

    /// Look up a descriptor, serving from cache while fresh.
    pub async fn get(&self, id: &str) -> Result<Option<AudioDescriptor>> {
        let now = self.clock.now();
        {
            let mut entries = self.entries.lock();
            if let Some(cached) = entries.get(id) {
                if now - cached.fetched_at < self.ttl {
                    trace!(audio_id = id, "Metadata cache hit");
                    return Ok(Some(cached.descriptor.clone()));
                }
                entries.pop(id);
            }
        }

        let found = self.catalog.get_audio(id).await?;
        if let Some(descriptor) = &found {
            self.entries.lock().put(
                id.to_string(),
                CachedDescriptor {
                    descriptor: descriptor.clone(),
                    fetched_at: now,
                },
            );
        }
        Ok(found)
    }

    /// Like [`get`](Self::get) but unknown ids are `AudioNotFound`.
    pub async fn require(&self, id: &str) -> Result<AudioDescriptor> {
        self.get(id)
            .await?
            .ok_or_else(|| DeliveryError::AudioNotFound(id.to_string()))
    }

    pub fn invalidate(&self, id: &str) {
        self.entries.lock().pop(id);
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::{AudioFormat, AudioMetadata, ManualClock};
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingCatalog {
        lookups: AtomicUsize,
    }

    #[async_trait]
    impl AudioCatalog for CountingCatalog {
        async fn get_audio(&self, id: &str) -> BridgeResult<Option<AudioDescriptor>> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            if id == "missing" {
                return Ok(None);
            }
            Ok(Some(AudioDescriptor {
                metadata: AudioMetadata {
                    id: id.to_string(),
                    file_size: 10,
                    duration: 1.0,
                    bitrate: 128,
                    format: AudioFormat::Mp3,
                },
                title: String::new(),
                category: None,
                speaker: None,
                tags: Vec::new(),
                uploaded_at: Utc::now(),
                storage_key: format!("{id}.mp3"),
            }))
        }

        async fn related(&self, _id: &str, _limit: usize) -> BridgeResult<Vec<AudioDescriptor>> {
            Ok(Vec::new())
        }

        async fn list_recent(&self, _limit: usize) -> BridgeResult<Vec<AudioDescriptor>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_hits_until_ttl_expires() {
        let catalog = Arc::new(CountingCatalog {
            lookups: AtomicUsize::new(0),
        });
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()));
        let cache = MetadataCache::with_limits(catalog.clone(), clock.clone(), 8, Duration::from_secs(60));

        cache.require("a").await.unwrap();
        cache.require("a").await.unwrap();
        assert_eq!(catalog.lookups.load(Ordering::SeqCst), 1);

        clock.advance(chrono::Duration::seconds(61));
        cache.require("a").await.unwrap();
        assert_eq!(catalog.lookups.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unknown_ids_are_not_cached() {
        let catalog = Arc::new(CountingCatalog {
            lookups: AtomicUsize::new(0),
        });
        let cache = MetadataCache::new(catalog.clone(), Arc::new(bridge_traits::SystemClock));

        assert!(matches!(
            cache.require("missing").await,
            Err(DeliveryError::AudioNotFound(_))
        ));
        assert!(cache.get("missing").await.unwrap().is_none());
        assert_eq!(catalog.lookups.load(Ordering::SeqCst), 2);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_capacity_evicts_least_recent() {
        let catalog = Arc::new(CountingCatalog {
            lookups: AtomicUsize::new(0),
        });
        let cache = MetadataCache::with_limits(catalog, Arc::new(bridge_traits::SystemClock), 2, DEFAULT_METADATA_TTL);
        cache.get("a").await.unwrap();
        cache.get("b").await.unwrap();
        cache.get("c").await.unwrap();
        assert_eq!(cache.len(), 2);

        cache.invalidate("c");
        assert_eq!(cache.len(), 1);
        cache.clear();
        assert!(cache.is_empty());
    }
}
