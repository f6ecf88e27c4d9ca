//! Error types for beacon-storage
//!
//! This module defines the error types used throughout the storage crate.
//! None of them are fatal: capacity errors are recovered by rolling back the
//! open write, misuse errors are reported to the caller.

use beacon_cbor::EncodeError;
use thiserror::Error;

/// Errors that can occur in event storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    /// A write session is already open
    #[error("Write already in progress")]
    WriteInProgress,

    /// No write session is open
    #[error("No write in progress")]
    NoWriteInProgress,

    /// The ring log cannot hold the requested bytes
    #[error("Storage full: requested {requested} bytes, {available} available")]
    StorageFull { requested: usize, available: usize },

    /// A record would not fit the 2-byte record header
    #[error("Record too large: {size} bytes exceeds {max}")]
    RecordTooLarge { size: usize, max: usize },

    /// A read or patch falls outside the readable region
    #[error("Out of bounds: offset {offset} + {len} bytes exceeds {available}")]
    OutOfBounds {
        offset: usize,
        len: usize,
        available: usize,
    },

    /// `read` was called without a batch discovered by `has_data`
    #[error("No active read")]
    NoActiveRead,

    /// A record header in the ring log is unreadable or malformed
    #[error("Corrupted record header at offset {offset}")]
    Corrupted { offset: usize },

    /// Storage cannot hold the largest record of an event type
    #[error("Storage too small for {event_type} events: {needed} bytes needed, {available} available")]
    StorageTooSmall {
        event_type: String,
        needed: usize,
        available: usize,
    },

    /// Failure reported by a non-volatile backend
    #[error("Non-volatile storage error: {0}")]
    NonVolatile(String),

    /// Encoding a record failed
    #[error("Encode error: {0}")]
    Encode(#[from] EncodeError),
}

impl StorageError {
    /// Create a new NonVolatile error
    pub fn nonvolatile(message: impl Into<String>) -> Self {
        Self::NonVolatile(message.into())
    }

    /// Whether the error means the event was dropped for lack of space
    pub fn is_capacity(&self) -> bool {
        matches!(
            self,
            Self::StorageFull { .. }
                | Self::RecordTooLarge { .. }
                | Self::Encode(EncodeError::BufferFull { .. })
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_full_error() {
        let err = StorageError::StorageFull {
            requested: 12,
            available: 3,
        };
        assert!(err.is_capacity());
        assert!(err.to_string().contains("12 bytes"));
    }

    #[test]
    fn test_encode_error_conversion() {
        let err: StorageError = EncodeError::BufferFull {
            needed: 4,
            remaining: 1,
        }
        .into();
        assert!(matches!(err, StorageError::Encode(_)));
        assert!(err.is_capacity());
    }

    #[test]
    fn test_misuse_is_not_capacity() {
        assert!(!StorageError::WriteInProgress.is_capacity());
        assert!(!StorageError::NoActiveRead.is_capacity());
    }

    #[test]
    fn test_nonvolatile_error() {
        let err = StorageError::nonvolatile("flash busy");
        assert!(matches!(err, StorageError::NonVolatile(_)));
        assert!(err.to_string().contains("flash busy"));
    }
}
