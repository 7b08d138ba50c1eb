//! Key/value storage backends
//!
//! The telemetry client keeps two pieces of state outside its buffers:
//! the bounded local log (durable, like a browser's `localStorage`) and the
//! custom context (scoped to one client instance, like `sessionStorage`).
//! Both go through the [`Storage`] trait so tests and embedders can swap
//! the backend.
//!
//! - [`MemoryStorage`]: lives as long as the value; the session-scoped default
//! - [`FileStorage`]: a single JSON object document on disk
//!
//! Writes are synchronous and replace the document by renaming a
//! finished temporary file over it. Two processes sharing one `FileStorage` path can
//! overwrite each other's writes; nothing coordinates them.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde_json::{Map, Value};
use tracing::warn;

use crate::error::StorageError;

/// String key/value storage
pub trait Storage: Send + Sync {
    /// Read the value stored under `key`.
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Store `value` under `key`, replacing any previous value.
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Remove `key`. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// In-memory storage, dropped with the owning client
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_entries(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.lock_entries().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.lock_entries().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.lock_entries().remove(key);
        Ok(())
    }
}

/// JSON-document storage on the local filesystem
///
/// The whole document is read and rewritten on every operation; the
/// mutex serializes access within one process. Reads report a corrupt
/// document, while writes replace it with a fresh one.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStorage {
    /// Creates a storage backed by the document at `path`.
    ///
    /// The file and its parent directories are created on first write.
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
        }
    }

    /// Returns the backing document path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_document(&self) -> Result<Map<String, Value>, StorageError> {
        if !self.path.exists() {
            return Ok(Map::new());
        }
        let content = std::fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(Map::new());
        }
        Ok(serde_json::from_str(&content)?)
    }

    /// Document to modify. An unparseable one is dropped so the next
    /// write can recover the file.
    fn read_document_for_write(&self) -> Result<Map<String, Value>, StorageError> {
        match self.read_document() {
            Err(StorageError::Corrupt(e)) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Replacing corrupt storage document"
                );
                Ok(Map::new())
            }
            other => other,
        }
    }

    fn write_document(&self, document: &Map<String, Value>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let partial_path = self.partial_path();
        std::fs::write(&partial_path, serde_json::to_string(document)?)?;
        std::fs::rename(&partial_path, &self.path)?;
        Ok(())
    }

    fn partial_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".partial");
        self.path.with_file_name(name)
    }

    /// A panic between read and write leaves the file as it was.
    fn lock_file(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Storage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let _guard = self.lock_file();
        let document = self.read_document()?;
        Ok(document
            .get(key)
            .and_then(|v| v.as_str())
            .map(str::to_string))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let _guard = self.lock_file();
        let mut document = self.read_document_for_write()?;
        document.insert(key.to_string(), Value::String(value.to_string()));
        self.write_document(&document)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let _guard = self.lock_file();
        match self.read_document() {
            Ok(mut document) => {
                if document.remove(key).is_some() {
                    self.write_document(&document)?;
                }
                Ok(())
            }
            // Nothing readable is left to remove the key from
            Err(StorageError::Corrupt(_)) => self.write_document(&Map::new()),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_storage_lifecycle() {
        let storage = MemoryStorage::new();
        assert!(storage.get("k").unwrap().is_none());

        storage.set("k", "v1").unwrap();
        storage.set("k", "v2").unwrap();
        assert_eq!(storage.get("k").unwrap().as_deref(), Some("v2"));

        storage.remove("k").unwrap();
        assert!(storage.get("k").unwrap().is_none());
        storage.remove("k").unwrap();
    }

    #[test]
    fn test_file_storage_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("store.json");

        let storage = FileStorage::new(path.clone());
        storage.set("lifeline.logs", "[]").unwrap();
        storage.set("other", "x").unwrap();

        let reopened = FileStorage::new(path);
        assert_eq!(reopened.get("lifeline.logs").unwrap().as_deref(), Some("[]"));
        assert_eq!(reopened.get("other").unwrap().as_deref(), Some("x"));

        reopened.remove("other").unwrap();
        assert!(storage.get("other").unwrap().is_none());
    }

    #[test]
    fn test_file_storage_missing_file_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path().join("absent.json"));
        assert!(storage.get("anything").unwrap().is_none());
    }

    #[test]
    fn test_file_storage_reports_corrupt_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(&path, "{not json").unwrap();

        let storage = FileStorage::new(path);
        assert!(matches!(storage.get("k"), Err(StorageError::Corrupt(_))));
    }

    #[test]
    fn test_file_storage_set_replaces_truncated_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(&path, r#"{"lifeline.logs": "["#).unwrap();

        let storage = FileStorage::new(path.clone());
        storage.set("lifeline.logs", "[]").unwrap();

        assert_eq!(storage.get("lifeline.logs").unwrap().as_deref(), Some("[]"));
        assert!(!dir.path().join("store.json.partial").exists());
    }

    #[test]
    fn test_file_storage_remove_recovers_truncated_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(&path, r#"{"lifeline.context": "{"#).unwrap();

        let storage = FileStorage::new(path);
        storage.remove("lifeline.context").unwrap();
        assert!(storage.get("lifeline.context").unwrap().is_none());
    }

    #[test]
    fn test_memory_storage_usable_after_poisoned_lock() {
        let storage = std::sync::Arc::new(MemoryStorage::new());
        storage.set("k", "v").unwrap();

        let poisoner = storage.clone();
        let _ = std::thread::spawn(move || {
            let _held = poisoner.entries.lock().unwrap();
            panic!("writer died");
        })
        .join();

        assert!(storage.entries.is_poisoned());
        assert_eq!(storage.get("k").unwrap().as_deref(), Some("v"));
        storage.remove("k").unwrap();
    }
}
