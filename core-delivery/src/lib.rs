//! # Adaptive Delivery Module
//!
//! Byte-range streaming, network estimation, quality selection and
//! predictive preloading for stored audio.
//!
//! ## Overview
//!
//! This module handles:
//! - `Range` header resolution and response headers ([`range`])
//! - Rolling network quality estimate ([`network`])
//! - Per-request quality profiles ([`quality`])
//! - Bounded in-memory preload cache ([`cache`])
//! - Candidate prediction and background fetches ([`preload`])
//! - Short-lived catalog metadata cache ([`metadata`])

pub mod cache;
pub mod error;
pub mod metadata;
pub mod network;
pub mod preload;
pub mod quality;
pub mod range;

pub use cache::{Admission, CachedEntrySummary, PreloadCache, PreloadCacheConfig, PreloadCacheStats};
pub use error::{DeliveryError, Result};
pub use metadata::MetadataCache;
pub use network::{
    NetworkMetrics, NetworkMonitor, NetworkMonitorConfig, NetworkQuality, PreloadStrategy, SampleSource,
};
pub use preload::{
    DeviceType, IntelligentPreloader, PreloadContext, PreloadReport, PreloaderConfig, SkipReason,
    UserPreferences,
};
pub use quality::{ProfileOptions, QualityProfile, QualityProfileSelector, RequestedQuality};
pub use range::{ByteRange, RangeKind, RangeRequestHandler, ServedRange};
