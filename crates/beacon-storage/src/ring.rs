//! # Ring Log
//!
//! Fixed-capacity byte store backing the event storage.
//!
//! The readable ("unread") region starts at the read cursor and ends at the
//! write cursor. It grows by [`RingLog::append`] and shrinks from either end:
//! [`RingLog::consume_front`] drops data that has been drained, while
//! [`RingLog::consume_tail`] undoes an uncommitted tail write.
//!
//! Offsets in this API are always logical, relative to the read cursor.

use crate::error::StorageError;

/// Contract the event storage requires of its byte store
pub trait RingLog {
    /// Append bytes at the write cursor, all or nothing
    fn append(&mut self, bytes: &[u8]) -> Result<(), StorageError>;

    /// Copy `buf.len()` bytes starting `offset` bytes past the read cursor
    /// without consuming them
    fn read(&self, offset: usize, buf: &mut [u8]) -> Result<(), StorageError>;

    /// Drop `n` bytes from the front of the readable region
    fn consume_front(&mut self, n: usize) -> Result<(), StorageError>;

    /// Drop the `n` most recently appended bytes
    fn consume_tail(&mut self, n: usize) -> Result<(), StorageError>;

    /// Overwrite bytes in place, starting `distance_from_tail` bytes before
    /// the write cursor
    fn patch_backward(
        &mut self,
        distance_from_tail: usize,
        bytes: &[u8],
    ) -> Result<(), StorageError>;

    /// Bytes in the readable region
    fn used_bytes(&self) -> usize;

    /// Bytes that can still be appended
    fn free_bytes(&self) -> usize;

    /// Total capacity
    fn capacity(&self) -> usize {
        self.used_bytes() + self.free_bytes()
    }
}

/// Heap-allocated circular buffer implementing [`RingLog`]
#[derive(Debug, Clone)]
pub struct CircularBuffer {
    storage: Box<[u8]>,
    /// Physical index of the first readable byte
    read_offset: usize,
    /// Length of the readable region
    read_size: usize,
}

impl CircularBuffer {
    /// Create an empty buffer holding up to `capacity` bytes
    pub fn new(capacity: usize) -> Self {
        Self::from_storage(vec![0; capacity])
    }

    /// Use an existing allocation as backing storage; its contents are
    /// treated as free space
    pub fn from_storage(storage: Vec<u8>) -> Self {
        Self {
            storage: storage.into_boxed_slice(),
            read_offset: 0,
            read_size: 0,
        }
    }

    fn physical(&self, logical: usize) -> usize {
        match self.storage.len() {
            0 => 0,
            len => (self.read_offset + logical) % len,
        }
    }

    fn check_range(&self, offset: usize, len: usize) -> Result<(), StorageError> {
        match offset.checked_add(len) {
            Some(end) if end <= self.read_size => Ok(()),
            _ => Err(StorageError::OutOfBounds {
                offset,
                len,
                available: self.read_size,
            }),
        }
    }

    /// Copy `bytes` into the ring starting at logical `offset`, wrapping
    fn copy_in(&mut self, offset: usize, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        let start = self.physical(offset);
        let first = bytes.len().min(self.storage.len() - start);
        self.storage[start..start + first].copy_from_slice(&bytes[..first]);
        self.storage[..bytes.len() - first].copy_from_slice(&bytes[first..]);
    }

    fn copy_out(&self, offset: usize, buf: &mut [u8]) {
        if buf.is_empty() {
            return;
        }
        let start = self.physical(offset);
        let first = buf.len().min(self.storage.len() - start);
        let (head, tail) = buf.split_at_mut(first);
        head.copy_from_slice(&self.storage[start..start + first]);
        tail.copy_from_slice(&self.storage[..tail.len()]);
    }
}

impl RingLog for CircularBuffer {
    fn append(&mut self, bytes: &[u8]) -> Result<(), StorageError> {
        let available = self.free_bytes();
        if bytes.len() > available {
            return Err(StorageError::StorageFull {
                requested: bytes.len(),
                available,
            });
        }
        self.copy_in(self.read_size, bytes);
        self.read_size += bytes.len();
        Ok(())
    }

    fn read(&self, offset: usize, buf: &mut [u8]) -> Result<(), StorageError> {
        self.check_range(offset, buf.len())?;
        self.copy_out(offset, buf);
        Ok(())
    }

    fn consume_front(&mut self, n: usize) -> Result<(), StorageError> {
        self.check_range(0, n)?;
        self.read_offset = self.physical(n);
        self.read_size -= n;
        Ok(())
    }

    fn consume_tail(&mut self, n: usize) -> Result<(), StorageError> {
        self.check_range(0, n)?;
        self.read_size -= n;
        Ok(())
    }

    fn patch_backward(
        &mut self,
        distance_from_tail: usize,
        bytes: &[u8],
    ) -> Result<(), StorageError> {
        if distance_from_tail > self.read_size || bytes.len() > distance_from_tail {
            return Err(StorageError::OutOfBounds {
                offset: self.read_size.saturating_sub(distance_from_tail),
                len: bytes.len(),
                available: self.read_size,
            });
        }
        self.copy_in(self.read_size - distance_from_tail, bytes);
        Ok(())
    }

    fn used_bytes(&self) -> usize {
        self.read_size
    }

    fn free_bytes(&self) -> usize {
        self.storage.len() - self.read_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_all(ring: &CircularBuffer) -> Vec<u8> {
        let mut out = vec![0; ring.used_bytes()];
        ring.read(0, &mut out).unwrap();
        out
    }

    #[test]
    fn test_append_and_read() {
        let mut ring = CircularBuffer::new(8);
        ring.append(b"abc").unwrap();
        ring.append(b"de").unwrap();

        assert_eq!(ring.used_bytes(), 5);
        assert_eq!(ring.free_bytes(), 3);
        assert_eq!(ring.capacity(), 8);

        let mut buf = [0u8; 3];
        ring.read(1, &mut buf).unwrap();
        assert_eq!(&buf, b"bcd");
    }

    #[test]
    fn test_append_all_or_nothing() {
        let mut ring = CircularBuffer::new(4);
        ring.append(b"abc").unwrap();
        assert!(matches!(
            ring.append(b"de"),
            Err(StorageError::StorageFull {
                requested: 2,
                available: 1
            })
        ));
        assert_eq!(read_all(&ring), b"abc");
    }

    #[test]
    fn test_read_past_end_fails() {
        let mut ring = CircularBuffer::new(8);
        ring.append(b"abc").unwrap();
        let mut buf = [0u8; 2];
        assert!(ring.read(2, &mut buf).is_err());
        assert!(ring.read(usize::MAX, &mut buf).is_err());
    }

    #[test]
    fn test_wrap_around() {
        let mut ring = CircularBuffer::new(8);
        ring.append(b"abcdef").unwrap();
        ring.consume_front(5).unwrap();
        ring.append(b"ghijk").unwrap();

        assert_eq!(ring.used_bytes(), 6);
        assert_eq!(read_all(&ring), b"fghijk");
    }

    #[test]
    fn test_consume_tail_undoes_append() {
        let mut ring = CircularBuffer::new(8);
        ring.append(b"abc").unwrap();
        ring.append(b"xyz").unwrap();
        ring.consume_tail(3).unwrap();

        assert_eq!(read_all(&ring), b"abc");
        assert!(ring.consume_tail(4).is_err());
    }

    #[test]
    fn test_patch_backward_across_wrap() {
        let mut ring = CircularBuffer::new(6);
        ring.append(b"1234").unwrap();
        ring.consume_front(4).unwrap();
        ring.append(b"..abcd").unwrap();

        // tail-relative distance 6 lands on the first byte, which sits at
        // physical index 4 with the rest wrapping to the start
        ring.patch_backward(6, b"XYZ").unwrap();
        assert_eq!(read_all(&ring), b"XYZbcd");
    }

    #[test]
    fn test_patch_backward_bounds() {
        let mut ring = CircularBuffer::new(8);
        ring.append(b"abc").unwrap();
        assert!(ring.patch_backward(4, b"x").is_err());
        assert!(ring.patch_backward(1, b"xy").is_err());
        ring.patch_backward(2, b"xy").unwrap();
        assert_eq!(read_all(&ring), b"axy");
    }

    #[test]
    fn test_zero_capacity() {
        let mut ring = CircularBuffer::new(0);
        assert!(ring.append(b"a").is_err());
        ring.append(b"").unwrap();
        ring.consume_front(0).unwrap();
        assert_eq!(ring.capacity(), 0);
    }
}
