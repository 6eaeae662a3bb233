//! # Host Bridge Traits
//!
//! Contracts between the audio delivery engine and the collaborators it does
//! not own.
//!
//! ## Overview
//!
//! The delivery engine serves bytes, estimates network quality and preloads
//! likely-next tracks. Everything else (the catalog of uploaded audio, where
//! the files live, how throughput is measured) is provided by the host through
//! the traits in this crate:
//!
//! - [`AudioCatalog`](catalog::AudioCatalog) - read-only audio metadata and descriptive fields
//! - [`AudioStorage`](storage::AudioStorage) - byte-range reads of stored audio files
//! - [`ThroughputProbe`](network::ThroughputProbe) - raw network throughput measurements
//! - [`Clock`](time::Clock) - time source for deterministic testing
//!
//! Native implementations live in `bridge-desktop`.
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Implementations
//! should map "does not exist" onto `BridgeError::NotFound` so callers can turn
//! it into a 404 instead of a 500.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync`; handles are shared as `Arc<dyn _>`
//! across request handlers and background tasks.

pub mod catalog;
pub mod error;
pub mod network;
pub mod storage;
pub mod time;

pub use error::BridgeError;

// Re-export commonly used types
pub use catalog::{AudioCatalog, AudioDescriptor, AudioFormat, AudioMetadata};
pub use network::{ProbeSample, ThroughputProbe};
pub use storage::{AudioStorage, RangeReader};
pub use time::{Clock, ManualClock, SystemClock};
