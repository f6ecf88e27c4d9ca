//! Error types for beacon-cbor

use thiserror::Error;

/// Errors that can occur while encoding
///
/// Any error leaves the destination holding a partial encoding. Callers
/// treat a multi-call encoding as one transaction and discard everything
/// written so far on the first failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    /// The item does not fit in the capacity declared for the encoder
    #[error("Encoder capacity exceeded: {needed} bytes needed, {remaining} remaining")]
    BufferFull { needed: usize, remaining: usize },

    /// More text was appended than announced by `encode_string_begin`
    #[error("Text string overrun: {attempted} bytes appended, {declared} declared")]
    StringOverrun { declared: usize, attempted: usize },

    /// A text string opened by `encode_string_begin` is still short of its
    /// declared length
    #[error("Text string underrun: {supplied} of {declared} declared bytes supplied")]
    StringUnderrun { declared: usize, supplied: usize },

    /// The sink refused a chunk
    #[error("Sink rejected {len} bytes at offset {offset}")]
    SinkRejected { offset: usize, len: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_full_message() {
        let err = EncodeError::BufferFull {
            needed: 9,
            remaining: 4,
        };
        assert!(err.to_string().contains("9 bytes needed"));
        assert!(err.to_string().contains("4 remaining"));
    }

    #[test]
    fn test_string_overrun_message() {
        let err = EncodeError::StringOverrun {
            declared: 3,
            attempted: 5,
        };
        assert!(matches!(err, EncodeError::StringOverrun { declared: 3, .. }));
    }

    #[test]
    fn test_string_underrun_message() {
        let err = EncodeError::StringUnderrun {
            declared: 5,
            supplied: 2,
        };
        assert_eq!(
            err.to_string(),
            "Text string underrun: 2 of 5 declared bytes supplied"
        );
    }
}
