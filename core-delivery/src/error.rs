//! # Delivery Error Types
//!
//! Error types for range serving, preloading and catalog access.

use bridge_traits::error::BridgeError;
use thiserror::Error;

/// Errors that can occur while delivering audio.
#[derive(Error, Debug)]
pub enum DeliveryError {
    // ========================================================================
    // Request Errors
    // ========================================================================
    /// Audio id is not in the catalog.
    #[error("Audio not found: {0}")]
    AudioNotFound(String),

    /// Range header cannot be satisfied for a file of this size.
    #[error("Range not satisfiable for file of {file_size} bytes")]
    RangeNotSatisfiable { file_size: u64 },

    /// Preload trigger body is malformed.
    #[error("Invalid preload context: {0}")]
    InvalidContext(String),

    // ========================================================================
    // Fetch Errors
    // ========================================================================
    /// Storage or catalog collaborator failed.
    #[error("Storage error: {0}")]
    Storage(#[from] BridgeError),

    /// Operation exceeded its deadline.
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Operation was abandoned because a newer request superseded it.
    #[error("Operation cancelled")]
    Cancelled,

    // ========================================================================
    // Other
    // ========================================================================
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DeliveryError {
    /// Returns true if retrying later may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            DeliveryError::Timeout(_) => true,
            DeliveryError::Storage(BridgeError::NotAvailable(_)) => true,
            DeliveryError::Storage(BridgeError::Io(_)) => true,
            _ => false,
        }
    }

    /// Returns true if the error maps to "not found" for the client.
    pub fn is_not_found(&self) -> bool {
        match self {
            DeliveryError::AudioNotFound(_) => true,
            DeliveryError::Storage(e) => e.is_not_found(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, DeliveryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(DeliveryError::Timeout("probe".into()).is_transient());
        assert!(!DeliveryError::Cancelled.is_transient());
        assert!(DeliveryError::AudioNotFound("x".into()).is_not_found());
        assert!(DeliveryError::Storage(BridgeError::NotFound("k".into())).is_not_found());
        assert!(!DeliveryError::RangeNotSatisfiable { file_size: 10 }.is_not_found());
    }
}
