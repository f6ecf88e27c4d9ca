//! # Event Storage
//!
//! RAM-backed storage for serialized events waiting to be drained by the
//! transport.
//!
//! ## Record Framing
//!
//! Each record lives in the ring log as:
//!
//! ```text
//! [total_size:u16 LE][body:total_size-2]
//! ```
//!
//! While a write session is open its header holds [`WRITE_IN_PROGRESS`],
//! which no committed record can carry. Readers stop at that sentinel, so a
//! record whose write never finished (reset mid-write, encoder failure) is
//! never exposed.
//!
//! ## Writes
//!
//! `begin_write` reserves the header, `append_data` streams the body and
//! `finish_write` either patches the real size into the header or removes
//! every byte of the session from the tail.
//!
//! ## Reads
//!
//! `has_data` walks records from the front and opens a read batch. With
//! batching enabled several records are folded together behind a
//! synthesized CBOR array head. `read` addresses that batch as one
//! contiguous stream of record bodies (record headers are skipped) and
//! `mark_read` consumes the whole batch.

use tracing::{debug, trace, warn};

use crate::batched::BatchedEventsHeader;
use crate::config::{EventStorageConfig, ReadBatchingConfig};
use crate::error::StorageError;
use crate::lock::{LockGuard, NoopLock, StorageLock};
use crate::nonvolatile::{EventReader, NonVolatileStorage};
use crate::ring::{CircularBuffer, RingLog};
use crate::source::{ActiveSource, DataSource};

/// Size of the per-record length header
pub const RECORD_HEADER_SIZE: usize = 2;

/// Header value marking a record whose write session is still open
pub const WRITE_IN_PROGRESS: u16 = 0xFFFF;

/// Largest total record size (header included) that can be committed
pub const MAX_RECORD_SIZE: usize = WRITE_IN_PROGRESS as usize - 1;

/// Write side of an event store, used by producers
pub trait EventWriter {
    /// Open a write session, returning the free space left for the body
    fn begin_write(&mut self) -> Result<usize, StorageError>;

    /// Append body bytes to the open session
    fn append_data(&mut self, bytes: &[u8]) -> Result<(), StorageError>;

    /// Close the open session, committing it or undoing it completely
    fn finish_write(&mut self, rollback: bool) -> Result<(), StorageError>;

    /// Total capacity of the store
    fn storage_size(&self) -> usize;
}

/// Occupancy of the RAM ring log
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StorageStats {
    pub bytes_used: usize,
    pub bytes_free: usize,
}

/// Passed to the persist callback after every commit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersistStatus {
    pub volatile_storage: StorageStats,
}

/// Notification asking the integrator to schedule [`EventStorage::persist`]
pub type PersistCallback = Box<dyn FnMut(&PersistStatus)>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum WriteState {
    #[default]
    Idle,
    InProgress {
        /// Header included
        bytes_written: usize,
    },
}

/// Records folded into the currently open read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ReadBatch {
    /// Framed bytes (headers and bodies) of every folded record
    active_event_read_size: usize,
    num_events: usize,
    header: BatchedEventsHeader,
}

impl ReadBatch {
    fn new(active_event_read_size: usize, num_events: usize) -> Self {
        Self {
            active_event_read_size,
            num_events,
            header: BatchedEventsHeader::build(num_events),
        }
    }

    /// Bytes exposed to the reader
    fn total_size(&self) -> usize {
        self.active_event_read_size + self.header.len() - self.num_events * RECORD_HEADER_SIZE
    }
}

/// Ring log plus the write session and read cursor state machines
struct RamEventStore<R> {
    ring: R,
    write: WriteState,
    read: Option<ReadBatch>,
    batching: Option<ReadBatchingConfig>,
}

impl<R: RingLog> RamEventStore<R> {
    fn stats(&self) -> StorageStats {
        StorageStats {
            bytes_used: self.ring.used_bytes(),
            bytes_free: self.ring.free_bytes(),
        }
    }

    /// Framed size of the committed record at `offset`, `None` at the end of
    /// data or at an open write
    fn committed_record_size(&self, offset: usize) -> Option<usize> {
        let mut hdr = [0u8; RECORD_HEADER_SIZE];
        self.ring.read(offset, &mut hdr).ok()?;

        let total_size = u16::from_le_bytes(hdr);
        if total_size == WRITE_IN_PROGRESS {
            return None;
        }

        let total_size = usize::from(total_size);
        if total_size < RECORD_HEADER_SIZE || offset + total_size > self.ring.used_bytes() {
            warn!(offset, total_size, "Corrupted record header, ignoring remaining events");
            return None;
        }
        Some(total_size)
    }

    fn compute_read_batch(&self) -> Option<ReadBatch> {
        let mut active_event_read_size = 0;
        let mut num_events = 0;

        while let Some(total_size) = self.committed_record_size(active_event_read_size) {
            num_events += 1;
            active_event_read_size += total_size;

            let Some(batching) = self.batching else {
                break;
            };

            if num_events > 1
                && ReadBatch::new(active_event_read_size, num_events).total_size()
                    > batching.max_bytes
            {
                // leave this record for the next read
                num_events -= 1;
                active_event_read_size -= total_size;
                break;
            }
        }

        (num_events > 0).then(|| ReadBatch::new(active_event_read_size, num_events))
    }

    fn has_data(&mut self) -> Option<usize> {
        if let Some(batch) = &self.read {
            return Some(batch.total_size());
        }

        let batch = self.compute_read_batch()?;
        trace!(
            num_events = batch.num_events,
            framed_size = batch.active_event_read_size,
            total_size = batch.total_size(),
            "Opened read batch"
        );
        self.read = Some(batch);
        Some(batch.total_size())
    }

    fn mark_read(&mut self) {
        let Some(batch) = self.read.take() else {
            return;
        };

        if let Err(e) = self.ring.consume_front(batch.active_event_read_size) {
            warn!(error = %e, "Failed to consume read batch");
            return;
        }
        trace!(
            num_events = batch.num_events,
            framed_size = batch.active_event_read_size,
            "Consumed read batch"
        );
    }

    fn begin_write(&mut self) -> Result<usize, StorageError> {
        if self.write != WriteState::Idle {
            return Err(StorageError::WriteInProgress);
        }

        self.ring.append(&WRITE_IN_PROGRESS.to_le_bytes())?;
        self.write = WriteState::InProgress {
            bytes_written: RECORD_HEADER_SIZE,
        };

        Ok(self.ring.free_bytes())
    }

    fn append_data(&mut self, bytes: &[u8]) -> Result<(), StorageError> {
        let WriteState::InProgress { bytes_written } = &mut self.write else {
            return Err(StorageError::NoWriteInProgress);
        };
        if bytes.is_empty() {
            return Ok(());
        }

        self.ring.append(bytes)?;
        *bytes_written += bytes.len();
        Ok(())
    }

    /// Returns whether a record was committed
    fn finish_write(&mut self, rollback: bool) -> Result<bool, StorageError> {
        let WriteState::InProgress { bytes_written } = std::mem::take(&mut self.write) else {
            return Err(StorageError::NoWriteInProgress);
        };

        if rollback {
            self.ring.consume_tail(bytes_written)?;
            debug!(bytes = bytes_written, "Rolled back event write");
            return Ok(false);
        }

        if bytes_written > MAX_RECORD_SIZE {
            self.ring.consume_tail(bytes_written)?;
            return Err(StorageError::RecordTooLarge {
                size: bytes_written,
                max: MAX_RECORD_SIZE,
            });
        }

        if bytes_written == RECORD_HEADER_SIZE {
            self.ring.consume_tail(bytes_written)?;
            debug!("Discarded empty event");
            return Ok(false);
        }

        let hdr = (bytes_written as u16).to_le_bytes();
        self.ring.patch_backward(bytes_written, &hdr)?;
        Ok(true)
    }
}

impl<R: RingLog> EventReader for RamEventStore<R> {
    fn read(&self, offset: usize, buf: &mut [u8]) -> Result<(), StorageError> {
        let batch = self.read.ok_or(StorageError::NoActiveRead)?;
        let total_size = batch.total_size();
        if offset.checked_add(buf.len()).is_none_or(|end| end > total_size) {
            return Err(StorageError::OutOfBounds {
                offset,
                len: buf.len(),
                available: total_size,
            });
        }

        let mut copied = 0;
        let mut offset = offset;

        // the batch header occupies the first logical bytes
        let header = batch.header.as_bytes();
        if offset < header.len() {
            let n = buf.len().min(header.len() - offset);
            buf[..n].copy_from_slice(&header[offset..offset + n]);
            copied = n;
            offset = 0;
        } else {
            offset -= header.len();
        }

        // `offset` is now relative to the concatenated record bodies
        let mut body_start = 0;
        let mut ring_offset = 0;
        while copied < buf.len() {
            let mut hdr = [0u8; RECORD_HEADER_SIZE];
            self.ring
                .read(ring_offset, &mut hdr)
                .map_err(|_| StorageError::Corrupted {
                    offset: ring_offset,
                })?;

            let total_size = usize::from(u16::from_le_bytes(hdr));
            if total_size < RECORD_HEADER_SIZE || total_size == usize::from(WRITE_IN_PROGRESS) {
                return Err(StorageError::Corrupted {
                    offset: ring_offset,
                });
            }

            ring_offset += RECORD_HEADER_SIZE;
            let body_len = total_size - RECORD_HEADER_SIZE;

            if body_start + body_len <= offset {
                body_start += body_len;
                ring_offset += body_len;
                continue;
            }

            let start_in_body = offset - body_start;
            let n = (body_len - start_in_body).min(buf.len() - copied);
            self.ring
                .read(ring_offset + start_in_body, &mut buf[copied..copied + n])
                .map_err(|_| StorageError::Corrupted {
                    offset: ring_offset,
                })?;

            copied += n;
            offset += n;
            body_start += body_len;
            ring_offset += body_len;
        }

        Ok(())
    }
}

/// Event storage engine
///
/// Owns the ring log, the write session and the read cursor. Producers write
/// through [`EventWriter`]; the transport drains through [`EventStorage::drain`].
///
/// ## Example
///
/// ```
/// use beacon_storage::{DataSource, EventStorage, EventStorageConfig, EventWriter};
///
/// let mut storage = EventStorage::with_capacity(256, EventStorageConfig::default());
///
/// storage.begin_write().unwrap();
/// storage.append_data(b"reboot").unwrap();
/// storage.finish_write(false).unwrap();
///
/// let mut drain = storage.drain();
/// let size = drain.has_more().unwrap();
/// let mut buf = vec![0; size];
/// drain.read(0, &mut buf).unwrap();
/// drain.mark_read();
/// assert_eq!(buf, b"reboot");
/// ```
pub struct EventStorage<R: RingLog = CircularBuffer, L: StorageLock = NoopLock> {
    ram: RamEventStore<R>,
    lock: L,
    config: EventStorageConfig,
    nonvolatile: Option<Box<dyn NonVolatileStorage>>,
    /// Backend state seen by the previous query
    nv_was_enabled: bool,
    persist_callback: Option<PersistCallback>,
}

impl EventStorage<CircularBuffer, NoopLock> {
    /// Create storage over a freshly allocated ring of `capacity` bytes
    pub fn with_capacity(capacity: usize, config: EventStorageConfig) -> Self {
        Self::new(CircularBuffer::new(capacity), config)
    }
}

impl<R: RingLog> EventStorage<R, NoopLock> {
    /// Create storage over an empty ring log
    pub fn new(ring: R, config: EventStorageConfig) -> Self {
        Self {
            ram: RamEventStore {
                ring,
                write: WriteState::Idle,
                read: None,
                batching: config.read_batching,
            },
            lock: NoopLock,
            config,
            nonvolatile: None,
            nv_was_enabled: false,
            persist_callback: None,
        }
    }
}

impl<R: RingLog, L: StorageLock> EventStorage<R, L> {
    /// Replace the lock wrapped around state-mutating sequences
    pub fn with_lock<L2: StorageLock>(self, lock: L2) -> EventStorage<R, L2> {
        EventStorage {
            ram: self.ram,
            lock,
            config: self.config,
            nonvolatile: self.nonvolatile,
            nv_was_enabled: self.nv_was_enabled,
            persist_callback: self.persist_callback,
        }
    }

    /// Register the callback invoked after every committed write
    pub fn with_persist_callback(mut self, callback: impl FnMut(&PersistStatus) + 'static) -> Self {
        self.persist_callback = Some(Box::new(callback));
        self
    }

    /// Register a non-volatile backend
    pub fn with_nonvolatile(mut self, backend: impl NonVolatileStorage + 'static) -> Self {
        self.nonvolatile = Some(Box::new(backend));
        self
    }

    pub fn config(&self) -> &EventStorageConfig {
        &self.config
    }

    /// The underlying ring log
    pub fn ring(&self) -> &R {
        &self.ram.ring
    }

    /// Whether a write session is open
    pub fn is_write_in_progress(&self) -> bool {
        self.ram.write != WriteState::Idle
    }

    /// Total bytes the next RAM read batch exposes, opening it if needed
    ///
    /// Calling this again without [`EventStorage::mark_read`] reports the
    /// same batch.
    pub fn has_data(&mut self) -> Option<usize> {
        let _guard = LockGuard::new(&self.lock);
        self.ram.has_data()
    }

    /// Read from the open RAM batch
    pub fn read(&self, offset: usize, buf: &mut [u8]) -> Result<(), StorageError> {
        let _guard = LockGuard::new(&self.lock);
        EventReader::read(&self.ram, offset, buf)
    }

    /// Consume every record of the open RAM batch
    pub fn mark_read(&mut self) {
        let _guard = LockGuard::new(&self.lock);
        self.ram.mark_read();
    }

    /// Bytes held by the RAM ring log
    pub fn bytes_used(&self) -> usize {
        self.stats().bytes_used
    }

    /// Bytes still free in the RAM ring log
    pub fn bytes_free(&self) -> usize {
        self.stats().bytes_free
    }

    pub fn stats(&self) -> StorageStats {
        let _guard = LockGuard::new(&self.lock);
        self.ram.stats()
    }

    /// Drain interface for the transport
    pub fn drain(&mut self) -> Drain<'_, R, L> {
        Drain { storage: self }
    }

    /// Source the drain interface reads from right now
    pub fn active_source(&mut self) -> ActiveSource {
        if self.nonvolatile_enabled() {
            ActiveSource::NonVolatile
        } else {
            ActiveSource::Ram
        }
    }

    /// Move every complete RAM batch into the non-volatile backend
    ///
    /// Returns the number of batches moved; zero when no backend is enabled.
    pub fn persist(&mut self) -> usize {
        if !self.nonvolatile_enabled() {
            return 0;
        }

        let mut events_saved = 0;
        while self.save_to_nonvolatile() {
            events_saved += 1;
        }

        if events_saved > 0 {
            debug!(events_saved, "Persisted events to non-volatile storage");
        }
        events_saved
    }

    fn save_to_nonvolatile(&mut self) -> bool {
        let Some(total_size) = self.has_data() else {
            return false;
        };
        let Some(backend) = self.nonvolatile.as_mut() else {
            return false;
        };

        if let Err(e) = backend.write(&self.ram, total_size) {
            warn!(error = %e, total_size, "Failed to persist event");
            return false;
        }

        self.mark_read();
        true
    }

    fn nonvolatile_enabled(&mut self) -> bool {
        let enabled = self.config.nv_support
            && self.nonvolatile.as_ref().is_some_and(|backend| backend.enabled());

        if self.nv_was_enabled && !enabled {
            // a read may have been copying into the backend when it failed
            warn!("Non-volatile event storage disabled, resetting read state");
            let _guard = LockGuard::new(&self.lock);
            self.ram.read = None;
        }

        self.nv_was_enabled = enabled;
        enabled
    }

    fn request_persist(&mut self) {
        let status = PersistStatus {
            volatile_storage: self.stats(),
        };
        if let Some(callback) = self.persist_callback.as_mut() {
            callback(&status);
        }
    }
}

impl<R: RingLog, L: StorageLock> EventWriter for EventStorage<R, L> {
    fn begin_write(&mut self) -> Result<usize, StorageError> {
        let _guard = LockGuard::new(&self.lock);
        self.ram.begin_write()
    }

    fn append_data(&mut self, bytes: &[u8]) -> Result<(), StorageError> {
        let _guard = LockGuard::new(&self.lock);
        self.ram.append_data(bytes)
    }

    fn finish_write(&mut self, rollback: bool) -> Result<(), StorageError> {
        let committed = {
            let _guard = LockGuard::new(&self.lock);
            self.ram.finish_write(rollback)?
        };

        if committed {
            trace!(bytes_used = self.ram.ring.used_bytes(), "Committed event");
            self.request_persist();
        }
        Ok(())
    }

    fn storage_size(&self) -> usize {
        let _guard = LockGuard::new(&self.lock);
        self.ram.ring.capacity()
    }
}

/// [`DataSource`] over an [`EventStorage`], serving the non-volatile backend
/// when it is enabled and RAM otherwise
pub struct Drain<'a, R: RingLog, L: StorageLock> {
    storage: &'a mut EventStorage<R, L>,
}

impl<R: RingLog, L: StorageLock> DataSource for Drain<'_, R, L> {
    fn has_more(&mut self) -> Option<usize> {
        match self.storage.active_source() {
            ActiveSource::Ram => self.storage.has_data(),
            ActiveSource::NonVolatile => self
                .storage
                .nonvolatile
                .as_mut()
                .and_then(|backend| backend.has_event()),
        }
    }

    fn read(&mut self, offset: usize, buf: &mut [u8]) -> Result<(), StorageError> {
        match self.storage.active_source() {
            ActiveSource::Ram => self.storage.read(offset, buf),
            ActiveSource::NonVolatile => match self.storage.nonvolatile.as_mut() {
                Some(backend) => backend.read(offset, buf),
                None => Err(StorageError::nonvolatile("no backend registered")),
            },
        }
    }

    fn mark_read(&mut self) {
        match self.storage.active_source() {
            ActiveSource::Ram => self.storage.mark_read(),
            ActiveSource::NonVolatile => {
                if let Some(backend) = self.storage.nonvolatile.as_mut() {
                    backend.consume();
                }
                // RAM events still waiting to be moved over
                if self.storage.has_data().is_some() {
                    self.storage.request_persist();
                }
            }
        }
    }
}
