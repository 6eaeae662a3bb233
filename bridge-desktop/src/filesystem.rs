//! Audio Storage Implementation using Tokio

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    storage::{AudioStorage, RangeReader},
};
use bytes::Bytes;
use std::io::SeekFrom;
use std::path::{Component, Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::debug;

/// Tokio-based audio storage rooted at a media directory
///
/// Storage keys are paths relative to the root. Keys that try to escape the
/// root (absolute paths, `..`) are rejected as not found.
pub struct FsAudioStorage {
    root: PathBuf,
}

impl FsAudioStorage {
    /// Create a storage reader for files below `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if key.is_empty() || escapes {
            return Err(BridgeError::NotFound(format!("Invalid storage key: {}", key)));
        }
        Ok(self.root.join(relative))
    }

    async fn open_at(&self, key: &str, start: u64) -> Result<File> {
        let path = self.resolve(key)?;
        let mut file = File::open(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                BridgeError::NotFound(format!("Audio file missing: {}", key))
            } else {
                BridgeError::Io(e)
            }
        })?;
        if start > 0 {
            file.seek(SeekFrom::Start(start)).await?;
        }
        Ok(file)
    }
}

#[async_trait]
impl AudioStorage for FsAudioStorage {
    async fn read_range(&self, key: &str, start: u64, len: u64) -> Result<Bytes> {
        let file = self.open_at(key, start).await?;
        let mut buffer = Vec::with_capacity(len as usize);
        file.take(len).read_to_end(&mut buffer).await?;

        if (buffer.len() as u64) < len {
            return Err(BridgeError::OperationFailed(format!(
                "Short read on {}: wanted {} bytes at {}, got {}",
                key,
                len,
                start,
                buffer.len()
            )));
        }

        debug!(key, start, len, "Read audio range");
        Ok(Bytes::from(buffer))
    }

    async fn open_range(&self, key: &str, start: u64, len: u64) -> Result<RangeReader> {
        let file = self.open_at(key, start).await?;
        debug!(key, start, len, "Opened audio range stream");
        Ok(Box::new(file.take(len)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    async fn fixture(name: &str) -> (FsAudioStorage, PathBuf) {
        let root = env::temp_dir().join(format!(
            "bridge-desktop-{}-{}",
            name,
            std::process::id()
        ));
        tokio::fs::create_dir_all(&root).await.unwrap();
        let data: Vec<u8> = (0..=255u8).cycle().take(4096).collect();
        tokio::fs::write(root.join("track.mp3"), &data).await.unwrap();
        (FsAudioStorage::new(root.clone()), root)
    }

    #[tokio::test]
    async fn test_read_range() {
        let (storage, root) = fixture("read").await;

        let bytes = storage.read_range("track.mp3", 10, 5).await.unwrap();
        assert_eq!(&bytes[..], &[10, 11, 12, 13, 14]);

        let tail = storage.read_range("track.mp3", 4090, 6).await.unwrap();
        assert_eq!(tail.len(), 6);

        tokio::fs::remove_dir_all(root).await.ok();
    }

    #[tokio::test]
    async fn test_short_read_is_error() {
        let (storage, root) = fixture("short").await;

        let result = storage.read_range("track.mp3", 4000, 200).await;
        assert!(matches!(result, Err(BridgeError::OperationFailed(_))));

        tokio::fs::remove_dir_all(root).await.ok();
    }

    #[tokio::test]
    async fn test_open_range_is_bounded() {
        let (storage, root) = fixture("stream").await;

        let mut reader = storage.open_range("track.mp3", 256, 300).await.unwrap();
        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        assert_eq!(out.len(), 300);
        assert_eq!(out[0], 0);

        tokio::fs::remove_dir_all(root).await.ok();
    }

    #[tokio::test]
    async fn test_missing_and_escaping_keys() {
        let (storage, root) = fixture("missing").await;

        let missing = storage.read_range("nope.mp3", 0, 1).await.unwrap_err();
        assert!(missing.is_not_found());

        let escape = storage.read_range("../etc/passwd", 0, 1).await.unwrap_err();
        assert!(escape.is_not_found());

        tokio::fs::remove_dir_all(root).await.ok();
    }
}
