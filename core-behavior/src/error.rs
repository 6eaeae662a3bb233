//! # Behavior Error Types

use bridge_traits::error::BridgeError;
use thiserror::Error;

/// Errors raised while recording or analyzing listening behavior.
#[derive(Error, Debug)]
pub enum BehaviorError {
    /// The submitted event is malformed (missing ids, negative position, ...).
    #[error("Invalid behavior event: {0}")]
    InvalidEvent(String),

    /// The catalog could not be queried.
    #[error("Catalog error: {0}")]
    Bridge(#[from] BridgeError),
}

impl BehaviorError {
    /// Returns true if the caller sent bad input.
    pub fn is_client_error(&self) -> bool {
        matches!(self, BehaviorError::InvalidEvent(_))
    }
}

pub type Result<T> = std::result::Result<T, BehaviorError>;
