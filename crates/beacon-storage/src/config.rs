//! Configuration types for the event storage

use serde::{Deserialize, Serialize};

/// Event storage configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventStorageConfig {
    /// Fold several records into one read; `None` reads one record at a time
    pub read_batching: Option<ReadBatchingConfig>,

    /// Consult a registered non-volatile backend
    pub nv_support: bool,
}

impl Default for EventStorageConfig {
    fn default() -> Self {
        Self {
            read_batching: None,
            nv_support: true,
        }
    }
}

impl EventStorageConfig {
    /// Batch reads, capping the bytes exposed by one read at `max_bytes`
    pub fn batched(max_bytes: usize) -> Self {
        Self {
            read_batching: Some(ReadBatchingConfig { max_bytes }),
            ..Self::default()
        }
    }

    /// Batch every complete record into a single read
    pub fn unlimited_batching() -> Self {
        Self::batched(ReadBatchingConfig::UNLIMITED)
    }

    /// Ignore any non-volatile backend
    pub fn without_nv_support(mut self) -> Self {
        self.nv_support = false;
        self
    }
}

/// Read batching limits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadBatchingConfig {
    /// Ceiling on the bytes exposed by one batched read
    ///
    /// A lone record is always readable even when it exceeds the ceiling.
    pub max_bytes: usize,
}

impl ReadBatchingConfig {
    pub const UNLIMITED: usize = u32::MAX as usize;
}

impl Default for ReadBatchingConfig {
    fn default() -> Self {
        Self {
            max_bytes: Self::UNLIMITED,
        }
    }
}
