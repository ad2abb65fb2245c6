//! Bounded, in-memory log of recent requests.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

/// How a request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CallOutcome {
    /// The operation succeeded.
    Success,
    /// The caller was refused (`AccessDenied` or `SignatureDoesNotMatch`).
    Rejected,
    /// The operation failed.
    Error,
}

/// One logged request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallRecord {
    /// When the request finished.
    pub timestamp: DateTime<Utc>,
    /// Operation name.
    pub operation: String,
    /// Target bucket, if any.
    pub bucket: Option<String>,
    /// Target key, if any.
    pub key: Option<String>,
    /// Outcome class.
    pub outcome: CallOutcome,
    /// HTTP status sent.
    pub status: u16,
    /// Handling time in milliseconds.
    pub duration_ms: u64,
    /// Error message, empty on success.
    pub message: String,
}

/// Most-recent-first ring of [`CallRecord`]s.
#[derive(Debug)]
pub struct CallLog {
    capacity: usize,
    entries: Mutex<VecDeque<CallRecord>>,
}

impl CallLog {
    /// Create a log keeping at most `capacity` records.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
        }
    }

    /// Append a record, evicting the oldest beyond capacity.
    pub fn record(&self, record: CallRecord) {
        if self.capacity == 0 {
            return;
        }
        let mut entries = self.entries.lock();
        entries.push_front(record);
        entries.truncate(self.capacity);
    }

    /// Snapshot of the log, most recent first.
    #[must_use]
    pub fn recent(&self) -> Vec<CallRecord> {
        self.entries.lock().iter().cloned().collect()
    }

    /// Number of records held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the log is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Drop every record.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}
