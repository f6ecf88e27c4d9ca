//! # Streaming Encoder
//!
//! Minimal CBOR (RFC 8949) encoder that never buffers a whole record.
//!
//! An [`Encoder`] runs in one of two modes over the same call sequence:
//!
//! - **write**: every primitive is checked against a declared capacity and
//!   handed to an [`EncoderSink`] as one or more contiguous chunks, each
//!   tagged with its logical offset in the record
//! - **size-only**: nothing is written and there is no capacity limit, the
//!   encoder only tallies the number of bytes a write pass would produce
//!
//! ## Integer Heads
//!
//! ```text
//! value < 24         [major|value]
//! value <= u8::MAX   [major|24][u8]
//! value <= u16::MAX  [major|25][u16 BE]
//! value <= u32::MAX  [major|26][u32 BE]
//! otherwise          [major|27][u64 BE]
//! ```
//!
//! The major type occupies the top 3 bits of the leading byte.

use crate::error::EncodeError;

/// CBOR major types (top 3 bits of the leading byte)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MajorType {
    /// Unsigned integer
    UnsignedInteger = 0,
    /// Negative integer, stored as `-1 - n`
    NegativeInteger = 1,
    /// Raw bytes
    ByteString = 2,
    /// UTF-8 text
    TextString = 3,
    /// Array of items
    Array = 4,
    /// Map of key/value pairs
    Map = 5,
    /// Semantic tag
    Tag = 6,
    /// Simple values and floats
    SimpleOrFloat = 7,
}

impl MajorType {
    /// Leading byte with the additional-info bits cleared
    pub const fn initial_byte(self) -> u8 {
        (self as u8) << 5
    }
}

/// Additional info marking a following 1-byte argument
const ADDITIONAL_INFO_U8: u8 = 24;
/// Additional info marking a following 2-byte argument
const ADDITIONAL_INFO_U16: u8 = 25;
/// Additional info marking a following 4-byte argument
const ADDITIONAL_INFO_U32: u8 = 26;
/// Additional info marking a following 8-byte argument
const ADDITIONAL_INFO_U64: u8 = 27;

/// Largest encoded head: leading byte plus an 8-byte argument
pub const MAX_HEAD_SIZE: usize = 9;

/// Destination for encoded bytes
///
/// `offset` is the logical position of `bytes[0]` within the record being
/// encoded. Offsets arrive in increasing order with no gaps or overlaps, so
/// a sink can append chunks directly without a staging buffer. Returning
/// `false` aborts the encoding.
pub trait EncoderSink {
    fn write(&mut self, offset: usize, bytes: &[u8]) -> bool;
}

impl<F> EncoderSink for F
where
    F: FnMut(usize, &[u8]) -> bool,
{
    fn write(&mut self, offset: usize, bytes: &[u8]) -> bool {
        self(offset, bytes)
    }
}

/// Sink that places chunks into a caller-provided slice
///
/// Usually paired with an encoder whose capacity is the slice length.
#[derive(Debug)]
pub struct SliceSink<'a> {
    buf: &'a mut [u8],
}

impl<'a> SliceSink<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf }
    }
}

impl EncoderSink for SliceSink<'_> {
    fn write(&mut self, offset: usize, bytes: &[u8]) -> bool {
        match offset.checked_add(bytes.len()) {
            Some(end) if end <= self.buf.len() => {
                self.buf[offset..end].copy_from_slice(bytes);
                true
            }
            _ => false,
        }
    }
}

/// Streaming encoder context
///
/// Owned by whoever drives a single encode operation. Create one with
/// [`Encoder::new`] or [`Encoder::size_only`], issue encode calls, then call
/// [`Encoder::finish`] to obtain the total encoded size.
pub struct Encoder<'a> {
    /// `None` in size-only mode
    sink: Option<&'a mut dyn EncoderSink>,
    capacity: usize,
    encoded_size: usize,
    /// Length announced by the last `encode_string_begin`
    text_declared: usize,
    /// Bytes still owed to a text string opened with `encode_string_begin`
    pending_text: usize,
}

impl<'a> Encoder<'a> {
    /// Create an encoder that writes through `sink`, failing any call that
    /// would grow the encoding past `capacity` bytes
    pub fn new(sink: &'a mut dyn EncoderSink, capacity: usize) -> Self {
        Self {
            sink: Some(sink),
            capacity,
            encoded_size: 0,
            text_declared: 0,
            pending_text: 0,
        }
    }

    /// Create an encoder that only computes the encoded size
    pub fn size_only() -> Self {
        Self {
            sink: None,
            capacity: usize::MAX,
            encoded_size: 0,
            text_declared: 0,
            pending_text: 0,
        }
    }

    /// Whether this encoder only tallies bytes
    pub fn is_size_only(&self) -> bool {
        self.sink.is_none()
    }

    /// Bytes produced so far
    pub fn encoded_size(&self) -> usize {
        self.encoded_size
    }

    /// Capacity left in write mode, `None` in size-only mode
    pub fn remaining(&self) -> Option<usize> {
        self.sink
            .as_ref()
            .map(|_| self.capacity.saturating_sub(self.encoded_size))
    }

    /// Finish the encoding and return the total number of bytes produced
    ///
    /// Fails if a text string opened with [`Encoder::encode_string_begin`]
    /// is still short of its announced length.
    pub fn finish(self) -> Result<usize, EncodeError> {
        self.ensure_text_closed()?;
        Ok(self.encoded_size)
    }

    /// Encode an unsigned integer (major type 0)
    pub fn encode_unsigned_integer(&mut self, value: u32) -> Result<(), EncodeError> {
        self.encode_head(MajorType::UnsignedInteger, u64::from(value))
    }

    /// Encode a signed integer, negative values as major type 1
    pub fn encode_signed_integer(&mut self, value: i32) -> Result<(), EncodeError> {
        self.encode_long_signed_integer(i64::from(value))
    }

    /// Encode a 64-bit signed integer, negative values as major type 1
    pub fn encode_long_signed_integer(&mut self, value: i64) -> Result<(), EncodeError> {
        if value < 0 {
            // -1 - value, which is the bitwise complement
            self.encode_head(MajorType::NegativeInteger, !value as u64)
        } else {
            self.encode_head(MajorType::UnsignedInteger, value as u64)
        }
    }

    /// Encode a double from its IEEE 754 bit pattern
    pub fn encode_u64_as_double(&mut self, bits: u64) -> Result<(), EncodeError> {
        self.ensure_text_closed()?;
        let mut head = [0u8; MAX_HEAD_SIZE];
        head[0] = MajorType::SimpleOrFloat.initial_byte() | ADDITIONAL_INFO_U64;
        head[1..].copy_from_slice(&bits.to_be_bytes());
        self.append(&head)
    }

    /// Encode a length-prefixed byte string
    pub fn encode_byte_string(&mut self, bytes: &[u8]) -> Result<(), EncodeError> {
        self.encode_head(MajorType::ByteString, bytes.len() as u64)?;
        self.append(bytes)
    }

    /// Encode a complete text string
    pub fn encode_string(&mut self, text: &str) -> Result<(), EncodeError> {
        self.encode_string_begin(text.len())?;
        self.encode_string_add(text.as_bytes())
    }

    /// Open a text string of `len` bytes to be supplied by
    /// [`Encoder::encode_string_add`]
    pub fn encode_string_begin(&mut self, len: usize) -> Result<(), EncodeError> {
        self.encode_head(MajorType::TextString, len as u64)?;
        self.text_declared = len;
        self.pending_text = len;
        Ok(())
    }

    /// Append a chunk to the text string opened by
    /// [`Encoder::encode_string_begin`]
    ///
    /// Chunks may split multi-byte UTF-8 sequences as long as their
    /// concatenation is valid text. Until the announced length is reached
    /// every other encode call fails with [`EncodeError::StringUnderrun`].
    pub fn encode_string_add(&mut self, chunk: &[u8]) -> Result<(), EncodeError> {
        if chunk.len() > self.pending_text {
            return Err(EncodeError::StringOverrun {
                declared: self.pending_text,
                attempted: chunk.len(),
            });
        }
        self.append(chunk)?;
        self.pending_text -= chunk.len();
        Ok(())
    }

    /// Open an array of `num_elements` items
    pub fn encode_array_begin(&mut self, num_elements: usize) -> Result<(), EncodeError> {
        self.encode_head(MajorType::Array, num_elements as u64)
    }

    /// Open a map of `num_pairs` key/value pairs
    pub fn encode_dictionary_begin(&mut self, num_pairs: usize) -> Result<(), EncodeError> {
        self.encode_head(MajorType::Map, num_pairs as u64)
    }

    /// Splice already-encoded CBOR into the stream verbatim
    pub fn join(&mut self, cbor: &[u8]) -> Result<(), EncodeError> {
        self.ensure_text_closed()?;
        self.append(cbor)
    }

    fn ensure_text_closed(&self) -> Result<(), EncodeError> {
        if self.pending_text > 0 {
            return Err(EncodeError::StringUnderrun {
                declared: self.text_declared,
                supplied: self.text_declared - self.pending_text,
            });
        }
        Ok(())
    }

    fn encode_head(&mut self, major: MajorType, value: u64) -> Result<(), EncodeError> {
        self.ensure_text_closed()?;
        let mut head = [0u8; MAX_HEAD_SIZE];
        let len = write_head(&mut head, major, value);
        self.append(&head[..len])
    }

    fn append(&mut self, bytes: &[u8]) -> Result<(), EncodeError> {
        if bytes.is_empty() {
            return Ok(());
        }

        let Some(sink) = self.sink.as_mut() else {
            self.encoded_size += bytes.len();
            return Ok(());
        };

        let remaining = self.capacity.saturating_sub(self.encoded_size);
        if bytes.len() > remaining {
            return Err(EncodeError::BufferFull {
                needed: bytes.len(),
                remaining,
            });
        }

        if !sink.write(self.encoded_size, bytes) {
            return Err(EncodeError::SinkRejected {
                offset: self.encoded_size,
                len: bytes.len(),
            });
        }

        self.encoded_size += bytes.len();
        Ok(())
    }
}

/// Write the minimal head for `value` into `out`, returning its length
pub fn write_head(out: &mut [u8; MAX_HEAD_SIZE], major: MajorType, value: u64) -> usize {
    let initial = major.initial_byte();
    if value < u64::from(ADDITIONAL_INFO_U8) {
        out[0] = initial | value as u8;
        1
    } else if let Ok(v) = u8::try_from(value) {
        out[0] = initial | ADDITIONAL_INFO_U8;
        out[1] = v;
        2
    } else if let Ok(v) = u16::try_from(value) {
        out[0] = initial | ADDITIONAL_INFO_U16;
        out[1..3].copy_from_slice(&v.to_be_bytes());
        3
    } else if let Ok(v) = u32::try_from(value) {
        out[0] = initial | ADDITIONAL_INFO_U32;
        out[1..5].copy_from_slice(&v.to_be_bytes());
        5
    } else {
        out[0] = initial | ADDITIONAL_INFO_U64;
        out[1..9].copy_from_slice(&value.to_be_bytes());
        9
    }
}
