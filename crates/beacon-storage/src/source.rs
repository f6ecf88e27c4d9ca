//! Drain interface exposed to the transport layer

use crate::error::StorageError;

/// Source of serialized messages that a transport drains
///
/// A drain cycle is `has_more` → one or more `read` calls → `mark_read`.
/// Abandoning a cycle is simply not calling `mark_read`; the next
/// `has_more` reports the same message again.
pub trait DataSource {
    /// Size of the next message, `None` when there is nothing to send
    fn has_more(&mut self) -> Option<usize>;

    /// Copy `buf.len()` bytes of the current message starting at `offset`
    fn read(&mut self, offset: usize, buf: &mut [u8]) -> Result<(), StorageError>;

    /// Release the current message
    fn mark_read(&mut self);
}

/// Backing store currently serving the drain interface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActiveSource {
    /// RAM ring log
    Ram,
    /// Registered non-volatile backend
    NonVolatile,
}
