//! Preload cache configuration

/// Configuration for the in-memory preload cache.
#[derive(Debug, Clone)]
pub struct PreloadCacheConfig {
    /// Maximum bytes held across all entries (default: 64 MiB)
    pub capacity_bytes: u64,
}

impl Default for PreloadCacheConfig {
    fn default() -> Self {
        Self {
            capacity_bytes: 64 * 1024 * 1024,
        }
    }
}

impl PreloadCacheConfig {
    /// Create a new cache configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set capacity in bytes.
    pub fn with_capacity_bytes(mut self, bytes: u64) -> Self {
        self.capacity_bytes = bytes;
        self
    }

    /// Set capacity in megabytes.
    pub fn with_capacity_mb(mut self, mb: u64) -> Self {
        self.capacity_bytes = mb * 1024 * 1024;
        self
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.capacity_bytes == 0 {
            return Err("capacity_bytes must be greater than 0".to_string());
        }

        Ok(())
    }
}
