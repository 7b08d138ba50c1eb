//! Local log persistence
//!
//! Keeps the most recent log entries as a JSON array under [`LOGS_KEY`]
//! in durable storage, so they can be inspected after the fact even when
//! remote logging failed. The array never holds more than `max_entries`;
//! the oldest entries go first.

use std::sync::Arc;

use lifeline_core::domain::LogEntry;

use crate::error::StorageError;
use crate::storage::Storage;

/// Storage key for persisted log entries
pub const LOGS_KEY: &str = "lifeline.logs";

/// Default number of entries kept
pub const DEFAULT_MAX_ENTRIES: usize = 100;

/// Bounded log history in a [`Storage`] backend
pub struct LocalLogStore {
    storage: Arc<dyn Storage>,
    max_entries: usize,
}

impl LocalLogStore {
    pub fn new(storage: Arc<dyn Storage>, max_entries: usize) -> Self {
        Self {
            storage,
            max_entries,
        }
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Append `entry`, trimming the history to `max_entries`.
    pub fn append(&self, entry: &LogEntry) -> Result<(), StorageError> {
        let mut entries = self.entries()?;
        entries.push(entry.clone());
        if entries.len() > self.max_entries {
            let excess = entries.len() - self.max_entries;
            entries.drain(..excess);
        }
        let raw = serde_json::to_string(&entries)?;
        self.storage.set(LOGS_KEY, &raw)
    }

    /// All persisted entries, oldest first.
    pub fn entries(&self) -> Result<Vec<LogEntry>, StorageError> {
        match self.storage.get(LOGS_KEY)? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(Vec::new()),
        }
    }

    /// Delete all persisted entries.
    pub fn clear(&self) -> Result<(), StorageError> {
        self.storage.remove(LOGS_KEY)
    }
}
