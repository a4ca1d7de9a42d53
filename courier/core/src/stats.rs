//! Sender Statistics
//!
//! Lock-free delivery counters and their export to an info collector.
//!
//! The counters are the only sender state that may be touched from several
//! threads at once. The endpoint behind a [`Sender`](crate::Sender) is only
//! reachable through `&mut`, so sends themselves are serialized by the
//! caller; the statistics handle can be cloned out and read anywhere.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Cumulative delivery counters for one sender
#[derive(Debug, Default)]
pub struct SenderStatistics {
    bytes_sent: AtomicU64,
    messages_sent: AtomicU64,
}

impl SenderStatistics {
    /// Create zeroed counters
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one delivered message of `size` payload bytes
    pub fn record_delivery(&self, size: usize) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(size as u64, Ordering::Relaxed);
    }

    /// Payload bytes delivered so far
    #[must_use]
    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent.load(Ordering::Relaxed)
    }

    /// Messages delivered so far
    #[must_use]
    pub fn messages_sent(&self) -> u64 {
        self.messages_sent.load(Ordering::Relaxed)
    }

    /// Point-in-time copy of both counters
    #[must_use]
    pub fn snapshot(&self) -> SenderInfo {
        SenderInfo {
            bytes: self.bytes_sent(),
            messages: self.messages_sent(),
        }
    }
}

/// Exported view of the sender counters
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderInfo {
    /// Payload bytes delivered
    pub bytes: u64,
    /// Messages delivered
    pub messages: u64,
}

/// Accumulates info records for an external monitoring pipeline
#[derive(Clone, Debug, Default)]
pub struct InfoCollector {
    entries: Map<String, Value>,
}

impl InfoCollector {
    /// Create an empty collector
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a record under `key`, replacing any earlier record with that key
    pub fn add<T: Serialize>(&mut self, key: &str, info: &T) -> Result<(), serde_json::Error> {
        let value = serde_json::to_value(info)?;
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    /// Look up a record
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Whether nothing has been collected
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Consume the collector into a JSON object
    #[must_use]
    pub fn into_value(self) -> Value {
        Value::Object(self.entries)
    }
}
