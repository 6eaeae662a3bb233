//! Audio Storage Abstraction
//!
//! Read-only access to stored audio bytes. The delivery engine never writes
//! through this trait; uploads are handled by the surrounding application.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::AsyncRead;

use crate::error::Result;

/// Boxed reader returned by [`AudioStorage::open_range`].
pub type RangeReader = Box<dyn AsyncRead + Send + Unpin>;

/// Byte-range reader over stored audio files.
///
/// `start` and `len` are always validated by the caller against the file size
/// from the catalog, so implementations may treat a short read as an error.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::AudioStorage;
///
/// async fn first_kib(storage: &dyn AudioStorage, key: &str) -> Result<Bytes> {
///     storage.read_range(key, 0, 1024).await
/// }
/// ```
#[async_trait]
pub trait AudioStorage: Send + Sync {
    /// Read `len` bytes starting at `start` fully into memory.
    ///
    /// Used for bounded reads such as preload chunks.
    async fn read_range(&self, key: &str, start: u64, len: u64) -> Result<Bytes>;

    /// Open a reader positioned at `start` that yields at most `len` bytes.
    ///
    /// Used for streamed response bodies.
    async fn open_range(&self, key: &str, start: u64, len: u64) -> Result<RangeReader>;
}
