//! Preload cache statistics

use serde::{Deserialize, Serialize};

/// Statistics about the preload cache.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreloadCacheStats {
    /// Number of cached entries
    pub entries: usize,

    /// Bytes currently held
    pub total_bytes: u64,

    /// Configured capacity in bytes
    pub capacity_bytes: u64,

    /// Playback starts that found a cached entry
    pub hits: u64,

    /// Playback starts with nothing cached
    pub misses: u64,

    /// hits / (hits + misses), 0.0 before any access
    pub hit_rate: f64,

    /// Entries admitted since the last clear
    pub admissions: u64,

    /// Entries evicted to make room
    pub evictions: u64,

    /// Entries refused because they could never fit
    pub rejected: u64,
}

impl PreloadCacheStats {
    /// Cache usage as a percentage of capacity.
    pub fn usage_percentage(&self) -> f64 {
        if self.capacity_bytes == 0 {
            return 0.0;
        }

        (self.total_bytes as f64 / self.capacity_bytes as f64) * 100.0
    }

    /// Returns true if the cache is near capacity (>90%).
    pub fn is_near_capacity(&self) -> bool {
        self.usage_percentage() > 90.0
    }

    /// Bytes still free.
    pub fn free_bytes(&self) -> u64 {
        self.capacity_bytes.saturating_sub(self.total_bytes)
    }

    pub(crate) fn compute_hit_rate(hits: u64, misses: u64) -> f64 {
        let total = hits + misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage() {
        let stats = PreloadCacheStats {
            total_bytes: 95,
            capacity_bytes: 100,
            ..Default::default()
        };
        assert!(stats.is_near_capacity());
        assert_eq!(stats.free_bytes(), 5);
        assert_eq!(PreloadCacheStats::default().usage_percentage(), 0.0);
    }

    #[test]
    fn test_hit_rate() {
        assert_eq!(PreloadCacheStats::compute_hit_rate(0, 0), 0.0);
        assert_eq!(PreloadCacheStats::compute_hit_rate(3, 1), 0.75);
    }
}
