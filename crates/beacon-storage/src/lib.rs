//! # Beacon Storage
//!
//! Event storage for Beacon telemetry on constrained devices.
//!
//! Producers encode diagnostic records (traces, heartbeats, logs) straight
//! into a fixed-capacity RAM ring log; a transport later drains them.
//!
//! ## Features
//!
//! - **Two-phase writes**: reserve, append, then commit or roll back; an
//!   unfinished write is never visible to readers
//! - **Read batching**: several records can be drained as one CBOR array
//!   under a configurable byte ceiling
//! - **Spanning reads**: one offset-addressed read may cover several
//!   physically separate records
//! - **Non-volatile persistence**: optional backend that RAM records are
//!   relocated into before power loss
//! - **SerializerHelper**: encode-to-storage with rollback, drop accounting
//!   and a boot-time worst-case size check
//!
//! ## Example
//!
//! ```
//! use beacon_storage::{
//!     DataSource, EventStorage, EventStorageConfig, SerializerHelper,
//! };
//!
//! let mut storage = EventStorage::with_capacity(512, EventStorageConfig::unlimited_batching());
//! let mut helper = SerializerHelper::new();
//!
//! for count in 0..3u32 {
//!     helper
//!         .encode_to_storage(&mut storage, |e| {
//!             e.encode_dictionary_begin(1)?;
//!             e.encode_string("count")?;
//!             e.encode_unsigned_integer(count)
//!         })
//!         .unwrap();
//! }
//!
//! let mut drain = storage.drain();
//! let size = drain.has_more().unwrap();
//! let mut message = vec![0; size];
//! drain.read(0, &mut message).unwrap();
//! drain.mark_read();
//!
//! // three records behind a synthesized array head
//! assert_eq!(message[0], 0x83);
//! assert!(drain.has_more().is_none());
//! ```

pub mod batched;
pub mod config;
pub mod error;
pub mod event_storage;
pub mod lock;
pub mod nonvolatile;
pub mod ring;
pub mod serializer;
pub mod source;

// Re-exports
pub use batched::BatchedEventsHeader;
pub use config::{EventStorageConfig, ReadBatchingConfig};
pub use error::StorageError;
pub use event_storage::{
    Drain, EventStorage, EventWriter, PersistCallback, PersistStatus, StorageStats,
    MAX_RECORD_SIZE, RECORD_HEADER_SIZE, WRITE_IN_PROGRESS,
};
pub use lock::{LockGuard, NoopLock, StorageLock};
pub use nonvolatile::{EventReader, InMemoryNonVolatileStorage, NonVolatileStorage};
pub use ring::{CircularBuffer, RingLog};
pub use serializer::{check_storage_size, compute_size, SerializerHelper};
pub use source::{ActiveSource, DataSource};

// Re-export the encoder so producers need a single dependency
pub use beacon_cbor::{EncodeError, Encoder};
