use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use uuid::Uuid;

use crate::{frame::TreadmillSample, types::DEFAULT_RAW_LOG_CAPACITY};

/// One received frame kept for diagnostics
///
/// Frames that failed to decode are logged too, with `parsed` set to `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawLogEntry {
    /// When the frame was received
    pub timestamp: DateTime<Utc>,
    /// Characteristic the frame arrived on
    pub characteristic: Uuid,
    /// Lowercase hex rendering, one space between bytes
    pub hex: String,
    /// Exact frame bytes
    pub bytes: Vec<u8>,
    /// Decoded sample, or `None` if decoding failed
    pub parsed: Option<TreadmillSample>,
}

impl RawLogEntry {
    /// Create an entry stamped with the current time
    #[must_use]
    pub fn new(characteristic: Uuid, bytes: &[u8], parsed: Option<TreadmillSample>) -> Self {
        Self::at(Utc::now(), characteristic, bytes, parsed)
    }

    /// Create an entry with an explicit timestamp
    #[must_use]
    pub fn at(
        timestamp: DateTime<Utc>,
        characteristic: Uuid,
        bytes: &[u8],
        parsed: Option<TreadmillSample>,
    ) -> Self {
        Self {
            timestamp,
            characteristic,
            hex: to_hex(bytes),
            bytes: bytes.to_vec(),
            parsed,
        }
    }
}

/// Render bytes as `"0a ff 10"`
#[must_use]
pub fn to_hex(bytes: &[u8]) -> String {
    let mut hex = String::with_capacity(bytes.len() * 3);
    for (i, byte) in bytes.iter().enumerate() {
        if i > 0 {
            hex.push(' ');
        }
        let _ = write!(hex, "{byte:02x}");
    }
    hex
}

/// Drop the oldest elements so that at most `max_len` remain
///
/// Removes exactly `len - max_len` elements from the front when over capacity
/// and keeps the rest in order.
#[must_use]
pub fn trim<T>(mut entries: Vec<T>, max_len: usize) -> Vec<T> {
    let excess = entries.len().saturating_sub(max_len);
    entries.drain(..excess);
    entries
}

/// Destination for raw frame entries
pub trait RawLogSink {
    /// Record one entry, evicting old ones as needed
    ///
    /// # Errors
    ///
    /// Returns an error if the entry could not be persisted.
    fn append(&mut self, entry: RawLogEntry) -> crate::Result<()>;
}

/// In-memory bounded log of raw frames
#[derive(Debug, Clone)]
pub struct RawLog {
    entries: Vec<RawLogEntry>,
    capacity: usize,
}

impl Default for RawLog {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_RAW_LOG_CAPACITY)
    }
}

impl RawLog {
    /// Create an empty log holding at most `capacity` entries
    #[must_use]
    pub const fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::new(),
            capacity,
        }
    }

    /// Restore a log from previously persisted entries
    #[must_use]
    pub fn from_entries(entries: Vec<RawLogEntry>, capacity: usize) -> Self {
        Self {
            entries: trim(entries, capacity),
            capacity,
        }
    }

    /// Append an entry, dropping the oldest ones beyond capacity
    pub fn push(&mut self, entry: RawLogEntry) {
        self.entries.push(entry);
        self.entries = trim(std::mem::take(&mut self.entries), self.capacity);
    }

    /// Entries from oldest to newest
    #[must_use]
    pub fn entries(&self) -> &[RawLogEntry] {
        &self.entries
    }

    /// Number of stored entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the log is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum number of entries kept
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Remove every entry
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Consume the log, returning its entries
    #[must_use]
    pub fn into_entries(self) -> Vec<RawLogEntry> {
        self.entries
    }
}

impl RawLogSink for RawLog {
    fn append(&mut self, entry: RawLogEntry) -> crate::Result<()> {
        self.push(entry);
        Ok(())
    }
}
