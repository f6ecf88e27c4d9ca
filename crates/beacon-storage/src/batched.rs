//! Batched events header
//!
//! When several records are drained in one read, the reader sees them as the
//! elements of a single CBOR array. The array head is synthesized here from
//! the record count; it never occupies ring log space.

use beacon_cbor::{Encoder, SliceSink, MAX_HEAD_SIZE};

/// CBOR array head announcing how many records follow
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchedEventsHeader {
    data: [u8; MAX_HEAD_SIZE],
    length: usize,
}

impl BatchedEventsHeader {
    /// Build the header for `num_events` records
    ///
    /// A single record (or none) needs no framing and yields an empty header.
    pub fn build(num_events: usize) -> Self {
        if num_events <= 1 {
            return Self::default();
        }

        let mut data = [0u8; MAX_HEAD_SIZE];
        let length = {
            let mut sink = SliceSink::new(&mut data);
            let mut encoder = Encoder::new(&mut sink, MAX_HEAD_SIZE);
            // any head fits in MAX_HEAD_SIZE
            encoder
                .encode_array_begin(num_events)
                .and_then(|()| encoder.finish())
                .unwrap_or(0)
        };

        Self { data, length }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data[..self.length]
    }

    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_event_has_no_header() {
        assert!(BatchedEventsHeader::build(0).is_empty());
        assert!(BatchedEventsHeader::build(1).is_empty());
    }

    #[test]
    fn test_header_bytes() {
        assert_eq!(BatchedEventsHeader::build(2).as_bytes(), &[0x82]);
        assert_eq!(BatchedEventsHeader::build(23).as_bytes(), &[0x97]);
        assert_eq!(BatchedEventsHeader::build(24).as_bytes(), &[0x98, 0x18]);
        assert_eq!(BatchedEventsHeader::build(300).as_bytes(), &[0x99, 0x01, 0x2c]);
        assert_eq!(BatchedEventsHeader::build(70_000).len(), 5);
    }

    #[test]
    fn test_header_is_pure_function_of_count() {
        assert_eq!(BatchedEventsHeader::build(7), BatchedEventsHeader::build(7));
    }
}
