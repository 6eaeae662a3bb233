//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for servers and desktop hosts.
//!
//! ## Overview
//!
//! - `AudioStorage` using `tokio::fs` with seek + bounded reads
//! - `AudioCatalog` backed by a JSON manifest loaded into memory
//! - `ThroughputProbe` timing a download with `reqwest`
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{FsAudioStorage, JsonCatalog};
//!
//! #[tokio::main]
//! async fn main() {
//!     let catalog = JsonCatalog::from_path("catalog.json").await.unwrap();
//!     let storage = FsAudioStorage::new("/srv/audio");
//!
//!     // Hand both to the delivery service configuration
//! }
//! ```

mod catalog;
mod filesystem;
mod network;

pub use catalog::JsonCatalog;
pub use filesystem::FsAudioStorage;
pub use network::HttpThroughputProbe;
