//! # Beacon CBOR
//!
//! Streaming CBOR encoder used to serialize telemetry records on
//! constrained devices.
//!
//! ## Features
//!
//! - **Size-only pass**: compute the exact encoded size of a record with the
//!   same call sequence that writes it
//! - **Sink-driven writes**: bytes are handed to an [`EncoderSink`] as they are
//!   produced, with their logical offset, so no staging buffer is needed
//! - **Capacity checks**: write mode fails as soon as an item would overflow
//!   the declared capacity
//! - **Splicing**: pre-encoded records can be embedded verbatim
//!
//! Arrays and maps must declare their element count up front; there are no
//! indefinite-length forms.
//!
//! ## Example
//!
//! ```
//! use beacon_cbor::{Encoder, EncodeError};
//!
//! fn encode_reading(e: &mut Encoder<'_>) -> Result<(), EncodeError> {
//!     e.encode_dictionary_begin(1)?;
//!     e.encode_string("temp")?;
//!     e.encode_signed_integer(-4)
//! }
//!
//! let mut size_only = Encoder::size_only();
//! encode_reading(&mut size_only).unwrap();
//! let size = size_only.finish().unwrap();
//!
//! let mut out = Vec::new();
//! let mut sink = |_offset: usize, bytes: &[u8]| {
//!     out.extend_from_slice(bytes);
//!     true
//! };
//! let mut encoder = Encoder::new(&mut sink, size);
//! encode_reading(&mut encoder).unwrap();
//! assert_eq!(encoder.finish(), Ok(size));
//! assert_eq!(out, [0xa1, 0x64, b't', b'e', b'm', b'p', 0x23]);
//! ```

pub mod encoder;
pub mod error;

pub use encoder::{write_head, Encoder, EncoderSink, MajorType, SliceSink, MAX_HEAD_SIZE};
pub use error::EncodeError;
