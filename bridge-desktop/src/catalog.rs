//! Manifest-backed Audio Catalog
//!
//! Loads a JSON manifest exported by the content-management application and
//! answers catalog queries from memory. The manifest is either a bare array of
//! records or an object with an `audio` array.

use async_trait::async_trait;
use bridge_traits::{
    catalog::{same_label, AudioCatalog, AudioDescriptor},
    error::{BridgeError, Result},
};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

#[derive(Deserialize)]
#[serde(untagged)]
enum Manifest {
    Wrapped { audio: Vec<AudioDescriptor> },
    Bare(Vec<AudioDescriptor>),
}

/// In-memory catalog built from a JSON manifest
pub struct JsonCatalog {
    by_id: HashMap<String, AudioDescriptor>,
    /// Ids ordered newest upload first
    recent: Vec<String>,
}

impl JsonCatalog {
    /// Build a catalog from already-parsed records
    pub fn from_records(records: Vec<AudioDescriptor>) -> Self {
        let mut recent: Vec<&AudioDescriptor> = records.iter().collect();
        recent.sort_by(|a, b| {
            b.uploaded_at
                .cmp(&a.uploaded_at)
                .then_with(|| a.id().cmp(b.id()))
        });
        let recent = recent.into_iter().map(|d| d.id().to_string()).collect();

        let by_id = records
            .into_iter()
            .map(|d| (d.id().to_string(), d))
            .collect();

        Self { by_id, recent }
    }

    /// Parse a manifest from JSON text
    pub fn from_json(json: &str) -> Result<Self> {
        let manifest: Manifest = serde_json::from_str(json)
            .map_err(|e| BridgeError::OperationFailed(format!("Invalid catalog manifest: {}", e)))?;
        let records = match manifest {
            Manifest::Wrapped { audio } => audio,
            Manifest::Bare(audio) => audio,
        };
        Ok(Self::from_records(records))
    }

    /// Load a manifest file
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = tokio::fs::read_to_string(path).await?;
        let catalog = Self::from_json(&json)?;
        info!(path = ?path, items = catalog.len(), "Loaded audio catalog");
        Ok(catalog)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    fn similarity(a: &AudioDescriptor, b: &AudioDescriptor) -> usize {
        let mut score = a.shared_tags(b);
        if same_label(&a.category, &b.category) {
            score += 3;
        }
        if same_label(&a.speaker, &b.speaker) {
            score += 2;
        }
        score
    }
}

#[async_trait]
impl AudioCatalog for JsonCatalog {
    async fn get_audio(&self, id: &str) -> Result<Option<AudioDescriptor>> {
        Ok(self.by_id.get(id).cloned())
    }

    async fn related(&self, id: &str, limit: usize) -> Result<Vec<AudioDescriptor>> {
        let Some(current) = self.by_id.get(id) else {
            return Ok(Vec::new());
        };

        let mut related: Vec<(usize, &AudioDescriptor)> = self
            .recent
            .iter()
            .filter_map(|other_id| self.by_id.get(other_id))
            .filter(|other| current.is_related_to(other))
            .map(|other| (Self::similarity(current, other), other))
            .collect();

        // `recent` order is kept for equal similarity (stable sort)
        related.sort_by(|a, b| b.0.cmp(&a.0));

        Ok(related
            .into_iter()
            .take(limit)
            .map(|(_, d)| d.clone())
            .collect())
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<AudioDescriptor>> {
        Ok(self
            .recent
            .iter()
            .take(limit)
            .filter_map(|id| self.by_id.get(id).cloned())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"{
        "audio": [
            {"id": "a", "fileSize": 1000, "duration": 60.0, "bitrate": 128, "format": "mp3",
             "category": "jazz", "speaker": "amy", "tags": ["live"],
             "uploadedAt": "2024-01-01T00:00:00Z", "storageKey": "a.mp3"},
            {"id": "b", "fileSize": 2000, "duration": 120.0, "bitrate": 128, "format": "mp3",
             "category": "jazz", "speaker": "amy", "tags": ["live"],
             "uploadedAt": "2024-02-01T00:00:00Z", "storageKey": "b.mp3"},
            {"id": "c", "fileSize": 3000, "duration": 180.0, "bitrate": 320, "format": "flac",
             "category": "rock", "tags": ["live"],
             "uploadedAt": "2024-03-01T00:00:00Z", "storageKey": "c.flac"},
            {"id": "d", "fileSize": 4000, "duration": 240.0, "bitrate": 64, "format": "weird",
             "uploadedAt": "2024-04-01T00:00:00Z", "storageKey": "d.bin"}
        ]
    }"#;

    #[tokio::test]
    async fn test_lookup_and_recent() {
        let catalog = JsonCatalog::from_json(MANIFEST).unwrap();
        assert_eq!(catalog.len(), 4);

        let a = catalog.get_audio("a").await.unwrap().unwrap();
        assert_eq!(a.metadata.file_size, 1000);
        assert!(catalog.get_audio("zzz").await.unwrap().is_none());

        let recent = catalog.list_recent(2).await.unwrap();
        let ids: Vec<&str> = recent.iter().map(|d| d.id()).collect();
        assert_eq!(ids, vec!["d", "c"]);
    }

    #[tokio::test]
    async fn test_related_orders_by_similarity() {
        let catalog = JsonCatalog::from_json(MANIFEST).unwrap();

        let related = catalog.related("a", 10).await.unwrap();
        let ids: Vec<&str> = related.iter().map(|d| d.id()).collect();
        assert_eq!(ids, vec!["b", "c"]);

        assert!(catalog.related("missing", 10).await.unwrap().is_empty());
    }

    #[test]
    fn test_bare_array_manifest() {
        let json = r#"[{"id": "x", "fileSize": 1, "duration": 1.0, "bitrate": 1,
                        "format": "mp3", "uploadedAt": "2024-01-01T00:00:00Z",
                        "storageKey": "x.mp3"}]"#;
        let catalog = JsonCatalog::from_json(json).unwrap();
        assert_eq!(catalog.len(), 1);
        assert!(JsonCatalog::from_json("{not json").is_err());
    }
}
