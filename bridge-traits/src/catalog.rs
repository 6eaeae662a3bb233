//! Audio Catalog Abstraction
//!
//! The catalog is owned by the surrounding content-management application. The
//! delivery engine only reads from it: immutable per-file metadata for range
//! serving, and descriptive fields (category, speaker, tags, upload date) for
//! preload scoring and recommendations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Result;

/// Container/codec family of a stored audio file.
///
/// Parsing is lenient: anything unrecognised becomes [`AudioFormat::Unknown`]
/// so that a bad value never blocks playback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    Mp3,
    Aac,
    Ogg,
    Opus,
    Flac,
    Wav,
    #[default]
    #[serde(other)]
    Unknown,
}

impl AudioFormat {
    /// MIME type used for the `Content-Type` header.
    pub fn mime_type(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "audio/mpeg",
            AudioFormat::Aac => "audio/aac",
            AudioFormat::Ogg => "audio/ogg",
            AudioFormat::Opus => "audio/opus",
            AudioFormat::Flac => "audio/flac",
            AudioFormat::Wav => "audio/wav",
            AudioFormat::Unknown => "application/octet-stream",
        }
    }

    /// Lossless formats carry far more bytes per second of audio.
    pub fn is_lossless(&self) -> bool {
        matches!(self, AudioFormat::Flac | AudioFormat::Wav)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Aac => "aac",
            AudioFormat::Ogg => "ogg",
            AudioFormat::Opus => "opus",
            AudioFormat::Flac => "flac",
            AudioFormat::Wav => "wav",
            AudioFormat::Unknown => "unknown",
        }
    }

    /// All formats the engine knows how to label.
    pub fn supported() -> &'static [AudioFormat] {
        &[
            AudioFormat::Mp3,
            AudioFormat::Aac,
            AudioFormat::Ogg,
            AudioFormat::Opus,
            AudioFormat::Flac,
            AudioFormat::Wav,
        ]
    }
}

impl FromStr for AudioFormat {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "mp3" | "mpeg" | "audio/mpeg" => AudioFormat::Mp3,
            "aac" | "m4a" | "audio/aac" | "audio/mp4" => AudioFormat::Aac,
            "ogg" | "oga" | "vorbis" | "audio/ogg" => AudioFormat::Ogg,
            "opus" | "audio/opus" => AudioFormat::Opus,
            "flac" | "audio/flac" => AudioFormat::Flac,
            "wav" | "wave" | "audio/wav" => AudioFormat::Wav,
            _ => AudioFormat::Unknown,
        })
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable per-file metadata needed to serve bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioMetadata {
    pub id: String,
    /// Total size of the stored file in bytes
    pub file_size: u64,
    /// Duration in seconds
    pub duration: f64,
    /// Nominal bitrate in kbps
    pub bitrate: u32,
    pub format: AudioFormat,
}

/// Catalog record: the metadata plus the descriptive fields used for scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioDescriptor {
    #[serde(flatten)]
    pub metadata: AudioMetadata,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub speaker: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub uploaded_at: DateTime<Utc>,
    /// Location handed to [`AudioStorage`](crate::storage::AudioStorage).
    pub storage_key: String,
}

impl AudioDescriptor {
    pub fn id(&self) -> &str {
        &self.metadata.id
    }

    /// Number of tags shared with `other` (case-insensitive).
    pub fn shared_tags(&self, other: &AudioDescriptor) -> usize {
        self.tags
            .iter()
            .filter(|tag| other.tags.iter().any(|t| t.eq_ignore_ascii_case(tag)))
            .count()
    }

    /// Same category, same speaker, or at least one shared tag.
    pub fn is_related_to(&self, other: &AudioDescriptor) -> bool {
        if self.id() == other.id() {
            return false;
        }
        same_label(&self.category, &other.category)
            || same_label(&self.speaker, &other.speaker)
            || self.shared_tags(other) > 0
    }
}

/// Case-insensitive comparison of two optional labels; `None` never matches.
pub fn same_label(a: &Option<String>, b: &Option<String>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
        _ => false,
    }
}

/// Read-only view of the audio catalog.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::catalog::AudioCatalog;
///
/// async fn size_of(catalog: &dyn AudioCatalog, id: &str) -> Option<u64> {
///     let audio = catalog.get_audio(id).await.ok()??;
///     Some(audio.metadata.file_size)
/// }
/// ```
#[async_trait]
pub trait AudioCatalog: Send + Sync {
    /// Look up a single audio item. `Ok(None)` means the id is unknown.
    async fn get_audio(&self, id: &str) -> Result<Option<AudioDescriptor>>;

    /// Items sharing category, speaker or tags with `id`, most similar first.
    async fn related(&self, id: &str, limit: usize) -> Result<Vec<AudioDescriptor>>;

    /// Most recently uploaded items, newest first.
    async fn list_recent(&self, limit: usize) -> Result<Vec<AudioDescriptor>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(id: &str, category: Option<&str>, tags: &[&str]) -> AudioDescriptor {
        AudioDescriptor {
            metadata: AudioMetadata {
                id: id.to_string(),
                file_size: 1000,
                duration: 60.0,
                bitrate: 128,
                format: AudioFormat::Mp3,
            },
            title: id.to_string(),
            category: category.map(str::to_string),
            speaker: None,
            tags: tags.iter().map(|t| t.to_string()).collect(),
            uploaded_at: Utc::now(),
            storage_key: format!("{id}.mp3"),
        }
    }

    #[test]
    fn test_format_parsing_is_lenient() {
        assert_eq!("MP3".parse::<AudioFormat>().unwrap(), AudioFormat::Mp3);
        assert_eq!("audio/flac".parse::<AudioFormat>().unwrap(), AudioFormat::Flac);
        assert_eq!("m4a".parse::<AudioFormat>().unwrap(), AudioFormat::Aac);
        assert_eq!("midi".parse::<AudioFormat>().unwrap(), AudioFormat::Unknown);
        assert_eq!(AudioFormat::Unknown.mime_type(), "application/octet-stream");
    }

    #[test]
    fn test_unknown_format_deserializes() {
        let format: AudioFormat = serde_json::from_str("\"midi\"").unwrap();
        assert_eq!(format, AudioFormat::Unknown);
    }

    #[test]
    fn test_relatedness() {
        let a = descriptor("a", Some("Jazz"), &["live"]);
        let b = descriptor("b", Some("jazz"), &[]);
        let c = descriptor("c", Some("rock"), &["LIVE", "studio"]);
        let d = descriptor("d", None, &[]);

        assert!(a.is_related_to(&b));
        assert!(a.is_related_to(&c));
        assert_eq!(a.shared_tags(&c), 1);
        assert!(!a.is_related_to(&d));
        assert!(!a.is_related_to(&a));
    }
}
