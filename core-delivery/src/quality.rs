//! # Quality Profile Selection
//!
//! Maps a requested quality and the network estimate onto a concrete
//! bitrate / chunk size / buffer profile. Selection never fails: unknown
//! qualities mean `auto` and unknown formats get the generic table.

use crate::network::{NetworkMetrics, NetworkQuality};
use bridge_traits::AudioFormat;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Smallest chunk ever handed out (1 KiB).
pub const MIN_CHUNK_SIZE: usize = 1024;
/// Largest chunk ever handed out (1 MiB).
pub const MAX_CHUNK_SIZE: usize = 1024 * 1024;

/// Clamp any requested chunk size into `[MIN_CHUNK_SIZE, MAX_CHUNK_SIZE]`.
pub fn clamp_chunk_size(requested: u64) -> usize {
    requested.clamp(MIN_CHUNK_SIZE as u64, MAX_CHUNK_SIZE as u64) as usize
}

/// Quality the client asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestedQuality {
    #[default]
    Auto,
    High,
    Medium,
    Low,
}

impl RequestedQuality {
    /// Lenient parse; anything unrecognised is `Auto`.
    pub fn parse_lenient(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            Some("high") => RequestedQuality::High,
            Some("medium") => RequestedQuality::Medium,
            Some("low") => RequestedQuality::Low,
            _ => RequestedQuality::Auto,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestedQuality::Auto => "auto",
            RequestedQuality::High => "high",
            RequestedQuality::Medium => "medium",
            RequestedQuality::Low => "low",
        }
    }

    pub fn all() -> &'static [RequestedQuality] {
        &[
            RequestedQuality::Auto,
            RequestedQuality::High,
            RequestedQuality::Medium,
            RequestedQuality::Low,
        ]
    }
}

impl fmt::Display for RequestedQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A concrete delivery profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityProfile {
    /// Tier name: "high", "medium" or "low"
    pub name: String,
    /// Target bitrate in kbps
    pub target_bitrate: u32,
    /// Bytes per streamed chunk, always within `[MIN_CHUNK_SIZE, MAX_CHUNK_SIZE]`
    pub chunk_size: usize,
    /// Suggested client buffer in bytes
    pub buffer_size: usize,
}

impl QualityProfile {
    fn base(tier: NetworkQuality) -> Self {
        let (target_bitrate, chunk_size, buffer_size) = match tier {
            NetworkQuality::High => (320, 256 * 1024, 1024 * 1024),
            NetworkQuality::Medium => (192, 128 * 1024, 512 * 1024),
            NetworkQuality::Low => (96, 64 * 1024, 256 * 1024),
        };
        Self {
            name: tier.as_str().to_string(),
            target_bitrate,
            chunk_size,
            buffer_size,
        }
    }
}

/// Per-request knobs from the stream query string.
#[derive(Debug, Clone, Default)]
pub struct ProfileOptions {
    pub quality: RequestedQuality,
    /// Client allows network-driven selection (`adaptive=false` pins medium for `auto`)
    pub adaptive: bool,
    /// Explicit chunk size, clamped
    pub chunk_size: Option<u64>,
    /// Format of the stored file
    pub format: Option<AudioFormat>,
    /// Bitrate of the stored file in kbps
    pub source_bitrate: Option<u32>,
}

/// Chooses delivery profiles.
#[derive(Debug, Clone)]
pub struct QualityProfileSelector {
    adaptive_enabled: bool,
}

impl Default for QualityProfileSelector {
    fn default() -> Self {
        Self::new(true)
    }
}

impl QualityProfileSelector {
    /// `adaptive_enabled` is the server-wide switch; when off, `auto` is medium.
    pub fn new(adaptive_enabled: bool) -> Self {
        Self { adaptive_enabled }
    }

    pub fn adaptive_enabled(&self) -> bool {
        self.adaptive_enabled
    }

    fn tier(&self, requested: RequestedQuality, adaptive: bool, metrics: &NetworkMetrics) -> NetworkQuality {
        match requested {
            RequestedQuality::High => NetworkQuality::High,
            RequestedQuality::Medium => NetworkQuality::Medium,
            RequestedQuality::Low => NetworkQuality::Low,
            RequestedQuality::Auto if adaptive && self.adaptive_enabled => metrics.quality,
            RequestedQuality::Auto => NetworkQuality::Medium,
        }
    }

    /// Profile for a requested quality under the given network estimate.
    ///
    /// `auto` follows the network tier; explicit qualities override it.
    pub fn select_profile(&self, requested: RequestedQuality, metrics: &NetworkMetrics) -> QualityProfile {
        QualityProfile::base(self.tier(requested, true, metrics))
    }

    /// Full selection for a stream request.
    pub fn select_for_request(&self, options: &ProfileOptions, metrics: &NetworkMetrics) -> QualityProfile {
        let mut profile = QualityProfile::base(self.tier(options.quality, options.adaptive, metrics));

        // Lossless files move several times more bytes per second of audio
        if options.format.map_or(false, |f| f.is_lossless()) {
            profile.chunk_size *= 2;
            profile.buffer_size *= 2;
        }

        // No transcoding: never promise more than the file carries
        if let Some(source) = options.source_bitrate.filter(|b| *b > 0) {
            profile.target_bitrate = profile.target_bitrate.min(source);
        }

        let chunk = options.chunk_size.unwrap_or(profile.chunk_size as u64);
        profile.chunk_size = clamp_chunk_size(chunk);
        profile
    }

    /// Chunk sizes advertised to clients per tier.
    pub fn recommended_chunk_sizes(&self) -> Vec<(NetworkQuality, usize)> {
        [NetworkQuality::High, NetworkQuality::Medium, NetworkQuality::Low]
            .into_iter()
            .map(|tier| (tier, QualityProfile::base(tier).chunk_size))
            .collect()
    }
}
