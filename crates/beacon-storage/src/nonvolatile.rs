//! # Non-volatile Event Storage
//!
//! Optional backend that persists RAM-resident records before a power loss.
//!
//! When a backend is registered and reports itself enabled, the drain
//! interface serves records from it instead of from RAM, and
//! [`EventStorage::persist`](crate::EventStorage::persist) relocates RAM
//! batches into it byte for byte through an [`EventReader`].

use std::collections::VecDeque;

use tracing::debug;

use crate::error::StorageError;

/// Offset-addressed read over the currently open RAM batch
pub trait EventReader {
    /// Fill `buf` with the batch bytes starting at `offset`
    fn read(&self, offset: usize, buf: &mut [u8]) -> Result<(), StorageError>;
}

/// Hooks a non-volatile store must provide
pub trait NonVolatileStorage {
    /// Whether the backend is usable; re-evaluated on every drain query
    fn enabled(&self) -> bool;

    /// Size of the oldest stored event, `None` when empty
    fn has_event(&mut self) -> Option<usize>;

    /// Read part of the oldest stored event
    fn read(&mut self, offset: usize, buf: &mut [u8]) -> Result<(), StorageError>;

    /// Drop the oldest stored event
    fn consume(&mut self);

    /// Store one event of `total_size` bytes pulled through `reader`
    fn write(&mut self, reader: &dyn EventReader, total_size: usize) -> Result<(), StorageError>;
}

/// In-memory [`NonVolatileStorage`] for testing and simulation
#[derive(Debug, Clone)]
pub struct InMemoryNonVolatileStorage {
    events: VecDeque<Vec<u8>>,
    max_bytes: usize,
    enabled: bool,
}

impl InMemoryNonVolatileStorage {
    /// Create an enabled store holding at most `max_bytes` of events
    pub fn new(max_bytes: usize) -> Self {
        Self {
            events: VecDeque::new(),
            max_bytes,
            enabled: true,
        }
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Number of stored events
    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    /// Total bytes stored
    pub fn bytes_used(&self) -> usize {
        self.events.iter().map(Vec::len).sum()
    }

    /// Stored events, oldest first
    pub fn events(&self) -> impl Iterator<Item = &[u8]> {
        self.events.iter().map(Vec::as_slice)
    }
}

impl NonVolatileStorage for InMemoryNonVolatileStorage {
    fn enabled(&self) -> bool {
        self.enabled
    }

    fn has_event(&mut self) -> Option<usize> {
        self.events.front().map(Vec::len)
    }

    fn read(&mut self, offset: usize, buf: &mut [u8]) -> Result<(), StorageError> {
        let event = self.events.front().ok_or(StorageError::NoActiveRead)?;
        let end = offset
            .checked_add(buf.len())
            .filter(|end| *end <= event.len())
            .ok_or(StorageError::OutOfBounds {
                offset,
                len: buf.len(),
                available: event.len(),
            })?;
        buf.copy_from_slice(&event[offset..end]);
        Ok(())
    }

    fn consume(&mut self) {
        self.events.pop_front();
    }

    fn write(&mut self, reader: &dyn EventReader, total_size: usize) -> Result<(), StorageError> {
        let available = self.max_bytes.saturating_sub(self.bytes_used());
        if total_size > available {
            return Err(StorageError::StorageFull {
                requested: total_size,
                available,
            });
        }

        let mut event = vec![0; total_size];
        reader.read(0, &mut event)?;
        debug!(size = total_size, "Persisted event to non-volatile storage");
        self.events.push_back(event);
        Ok(())
    }
}
