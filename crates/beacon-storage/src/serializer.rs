//! # Serializer Helper
//!
//! Glue between record producers, the streaming encoder and an
//! [`EventWriter`].
//!
//! A producer describes its record once, as a function of an [`Encoder`].
//! The same function is used to write the record into storage and, at boot,
//! to compute the record's size without writing anything.

use beacon_cbor::{EncodeError, Encoder};
use tracing::{debug, error, info, warn};

use crate::error::StorageError;
use crate::event_storage::{EventWriter, MAX_RECORD_SIZE, RECORD_HEADER_SIZE};

/// Encodes records into storage and tracks events dropped for lack of space
#[derive(Debug, Default)]
pub struct SerializerHelper {
    storage_drops: u32,
}

impl SerializerHelper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events dropped since the last successful write
    pub fn storage_drops(&self) -> u32 {
        self.storage_drops
    }

    /// Encode one record straight into `storage`
    ///
    /// The encoder's capacity is the free space reported when the write
    /// session opens. Any failure rolls the session back so that no partial
    /// record is left behind. Returns the encoded body size.
    ///
    /// An `encode` that produces no bytes stores nothing and returns
    /// `Ok(0)`. It is not counted as a drop.
    pub fn encode_to_storage<W, F>(
        &mut self,
        storage: &mut W,
        encode: F,
    ) -> Result<usize, StorageError>
    where
        W: EventWriter + ?Sized,
        F: FnOnce(&mut Encoder<'_>) -> Result<(), EncodeError>,
    {
        let space_available = match storage.begin_write() {
            Ok(space) => space,
            Err(e) => {
                self.record_drop();
                return Err(e);
            }
        };
        let budget = space_available.min(MAX_RECORD_SIZE - RECORD_HEADER_SIZE);

        let encoded = {
            let mut sink = |_offset: usize, bytes: &[u8]| storage.append_data(bytes).is_ok();
            let mut encoder = Encoder::new(&mut sink, budget);
            encode(&mut encoder).and_then(|()| encoder.finish())
        };

        let outcome = match encoded {
            Ok(0) => {
                debug!("Encoded event is empty, nothing stored");
                storage.finish_write(true).map(|()| 0)
            }
            Ok(size) => storage.finish_write(false).map(|()| size),
            Err(e) => {
                if let Err(rollback_err) = storage.finish_write(true) {
                    warn!(error = %rollback_err, "Failed to roll back event write");
                }
                Err(e.into())
            }
        };

        match outcome {
            Ok(0) => {}
            Ok(_) => self.record_success(),
            Err(_) => self.record_drop(),
        }
        outcome
    }

    fn record_drop(&mut self) {
        if self.storage_drops == 0 {
            error!("Event storage full");
        }
        self.storage_drops = self.storage_drops.saturating_add(1);
    }

    fn record_success(&mut self) {
        if self.storage_drops > 0 {
            info!(drops = self.storage_drops, "Event saved successfully after drops");
            self.storage_drops = 0;
        }
    }
}

/// Size of the record `encode` produces, computed without writing it
pub fn compute_size<F>(encode: F) -> Result<usize, EncodeError>
where
    F: FnOnce(&mut Encoder<'_>) -> Result<(), EncodeError>,
{
    let mut encoder = Encoder::size_only();
    encode(&mut encoder)?;
    encoder.finish()
}

/// Check that `storage` can ever hold the worst-case record of `event_type`
///
/// Meant to run once at boot. The record header is counted. Returns the
/// framed size of the worst-case record.
pub fn check_storage_size<W, F>(
    storage: &W,
    event_type: &str,
    encode_worst_case: F,
) -> Result<usize, StorageError>
where
    W: EventWriter + ?Sized,
    F: FnOnce(&mut Encoder<'_>) -> Result<(), EncodeError>,
{
    let needed = compute_size(encode_worst_case)? + RECORD_HEADER_SIZE;
    let available = storage.storage_size();

    if needed > available {
        warn!(
            event_type,
            needed, available, "Event storage smaller than largest event"
        );
        return Err(StorageError::StorageTooSmall {
            event_type: event_type.to_string(),
            needed,
            available,
        });
    }
    Ok(needed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EventStorageConfig;
    use crate::event_storage::EventStorage;

    fn heartbeat(e: &mut Encoder<'_>) -> Result<(), EncodeError> {
        e.encode_dictionary_begin(2)?;
        e.encode_unsigned_integer(1)?;
        e.encode_string("uptime")?;
        e.encode_unsigned_integer(2)?;
        e.encode_unsigned_integer(86_400)
    }

    #[test]
    fn test_encode_to_storage_commits_record() {
        let mut storage = EventStorage::with_capacity(64, EventStorageConfig::default());
        let mut helper = SerializerHelper::new();

        let size = helper.encode_to_storage(&mut storage, heartbeat).unwrap();
        assert_eq!(size, compute_size(heartbeat).unwrap());
        assert_eq!(storage.bytes_used(), size + RECORD_HEADER_SIZE);

        let mut buf = vec![0; storage.has_data().unwrap()];
        storage.read(0, &mut buf).unwrap();
        assert_eq!(buf[0], 0xa2);
        assert_eq!(&buf[2..9], b"\x66uptime");
    }

    #[test]
    fn test_full_storage_rolls_back_and_counts_drops() {
        let size = compute_size(heartbeat).unwrap();
        let framed = size + RECORD_HEADER_SIZE;
        let mut storage =
            EventStorage::with_capacity(framed * 2 + 1, EventStorageConfig::default());
        let mut helper = SerializerHelper::new();

        helper.encode_to_storage(&mut storage, heartbeat).unwrap();
        helper.encode_to_storage(&mut storage, heartbeat).unwrap();
        let used = storage.bytes_used();

        for expected_drops in 1..=3 {
            let err = helper.encode_to_storage(&mut storage, heartbeat).unwrap_err();
            assert!(err.is_capacity());
            assert_eq!(helper.storage_drops(), expected_drops);
            assert_eq!(storage.bytes_used(), used);
            assert!(!storage.is_write_in_progress());
        }

        storage.has_data().unwrap();
        storage.mark_read();
        helper.encode_to_storage(&mut storage, heartbeat).unwrap();
        assert_eq!(helper.storage_drops(), 0);
    }

    #[test]
    fn test_begin_write_failure_counts_drop() {
        let mut storage = EventStorage::with_capacity(64, EventStorageConfig::default());
        let mut helper = SerializerHelper::new();

        storage.begin_write().unwrap();
        let err = helper.encode_to_storage(&mut storage, heartbeat).unwrap_err();
        assert!(matches!(err, StorageError::WriteInProgress));
        assert_eq!(helper.storage_drops(), 1);
        // the foreign session is left untouched
        assert!(storage.is_write_in_progress());
    }

    #[test]
    fn test_encode_error_propagates() {
        let mut storage = EventStorage::with_capacity(64, EventStorageConfig::default());
        let mut helper = SerializerHelper::new();

        let err = helper
            .encode_to_storage(&mut storage, |e| {
                e.encode_string_begin(1)?;
                e.encode_string_add(b"xy")
            })
            .unwrap_err();
        assert!(matches!(
            err,
            StorageError::Encode(EncodeError::StringOverrun { .. })
        ));
        assert_eq!(storage.bytes_used(), 0);
    }

    #[test]
    fn test_unterminated_string_is_rolled_back() {
        let mut storage = EventStorage::with_capacity(64, EventStorageConfig::default());
        let mut helper = SerializerHelper::new();

        let err = helper
            .encode_to_storage(&mut storage, |e| {
                e.encode_string_begin(5)?;
                e.encode_string_add(b"ab")
            })
            .unwrap_err();
        assert!(matches!(
            err,
            StorageError::Encode(EncodeError::StringUnderrun {
                declared: 5,
                supplied: 2
            })
        ));
        assert_eq!(storage.bytes_used(), 0);
        assert_eq!(storage.has_data(), None);
        assert!(!storage.is_write_in_progress());

        assert!(compute_size(|e| e.encode_string_begin(1)).is_err());
    }

    #[test]
    fn test_empty_encoding_stores_nothing() {
        let calls = std::rc::Rc::new(std::cell::Cell::new(0));
        let counter = std::rc::Rc::clone(&calls);
        let mut storage = EventStorage::with_capacity(64, EventStorageConfig::default())
            .with_persist_callback(move |_| counter.set(counter.get() + 1));
        let mut helper = SerializerHelper::new();

        assert_eq!(helper.encode_to_storage(&mut storage, |_| Ok(())).unwrap(), 0);
        assert_eq!(helper.storage_drops(), 0);

        // an empty encoding neither adds a drop nor clears earlier ones
        storage.begin_write().unwrap();
        assert!(helper.encode_to_storage(&mut storage, heartbeat).is_err());
        storage.finish_write(true).unwrap();
        assert_eq!(helper.encode_to_storage(&mut storage, |_| Ok(())).unwrap(), 0);
        assert_eq!(helper.storage_drops(), 1);
        assert_eq!(storage.bytes_used(), 0);
        assert_eq!(storage.has_data(), None);
        assert!(!storage.is_write_in_progress());
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn test_check_storage_size() {
        let storage = EventStorage::with_capacity(8, EventStorageConfig::default());
        let err = check_storage_size(&storage, "heartbeat", heartbeat).unwrap_err();
        assert!(matches!(
            err,
            StorageError::StorageTooSmall { available: 8, .. }
        ));

        let storage = EventStorage::with_capacity(64, EventStorageConfig::default());
        let needed = check_storage_size(&storage, "heartbeat", heartbeat).unwrap();
        assert_eq!(needed, compute_size(heartbeat).unwrap() + RECORD_HEADER_SIZE);
    }

    #[test]
    fn test_compute_size_ignores_occupancy() {
        let mut storage = EventStorage::with_capacity(16, EventStorageConfig::default());
        let before = compute_size(heartbeat).unwrap();
        let mut helper = SerializerHelper::new();
        let _ = helper.encode_to_storage(&mut storage, heartbeat);
        assert_eq!(compute_size(heartbeat).unwrap(), before);
    }
}
