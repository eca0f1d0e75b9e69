//! Bounded, insertion-ordered ring of human-readable event lines.
//!
//! Any component may append; the broadcast loop reads the tail once per
//! tick. Appends are also mirrored to `tracing` so the relay's own log
//! output carries the same events the dashboards see.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Local};

/// Number of entries the ring retains.
pub const LOG_CAPACITY: usize = 50;

/// One timestamped log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// Local time the entry was appended.
    pub timestamp: DateTime<Local>,
    /// The message text.
    pub message: String,
}

impl LogEntry {
    /// Wire rendering: `[HH:MM:SS] message`.
    pub fn render(&self) -> String {
        format!("[{}] {}", self.timestamp.format("%H:%M:%S"), self.message)
    }
}

/// Fixed-capacity FIFO of [`LogEntry`] values.
#[derive(Debug)]
pub struct LogRing {
    entries: Mutex<VecDeque<LogEntry>>,
    capacity: usize,
}

impl LogRing {
    /// Create an empty ring holding [`LOG_CAPACITY`] entries.
    pub fn new() -> Self {
        Self::with_capacity(LOG_CAPACITY)
    }

    /// Create an empty ring with a custom capacity (at least 1).
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Timestamp `message` with the current local time and append it,
    /// evicting the oldest entry when full.
    pub fn append(&self, message: impl Into<String>) {
        self.append_at(Local::now(), message);
    }

    /// Append with an explicit timestamp.
    pub fn append_at(&self, timestamp: DateTime<Local>, message: impl Into<String>) {
        let message = message.into();
        tracing::info!(target: "signalcast::events", "{message}");

        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        while entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(LogEntry { timestamp, message });
    }

    /// The most recent `k` entries in chronological order. Returns fewer
    /// when fewer exist.
    pub fn tail(&self, k: usize) -> Vec<LogEntry> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let skip = entries.len().saturating_sub(k);
        entries.iter().skip(skip).cloned().collect()
    }

    /// [`tail`](Self::tail) rendered for the wire.
    pub fn tail_rendered(&self, k: usize) -> Vec<String> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let skip = entries.len().saturating_sub(k);
        entries.iter().skip(skip).map(LogEntry::render).collect()
    }

    /// Number of entries currently held.
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether the ring is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of entries retained.
    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for LogRing {
    fn default() -> Self {
        Self::new()
    }
}
