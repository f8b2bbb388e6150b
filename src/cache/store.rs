//! Persistent key-value stores backing the catalog cache
//!
//! Provides the synchronous, string-keyed `KeyValueStore` interface along with
//! a file-backed implementation in the XDG cache directory and an in-memory
//! one for tests and for hosts without a usable cache directory.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use parking_lot::Mutex;
use thiserror::Error;

/// Errors raised by a persistent store
#[derive(Debug, Error)]
pub enum StorageError {
    /// Reading or writing the backing file failed
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// A value could not be encoded or decoded
    #[error("failed to (de)serialize stored value: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The value is larger than the store allows
    #[error("value for '{key}' is {size} bytes, store limit is {limit}")]
    QuotaExceeded { key: String, size: usize, limit: usize },

    /// A stored value exists but is unusable
    #[error("stored value for '{0}' is corrupt")]
    Corrupt(String),
}

/// A synchronous, string-keyed store that survives process restarts
pub trait KeyValueStore: Send + Sync {
    /// Reads the value for `key`, `Ok(None)` if it was never written
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Writes `value` under `key`, replacing any previous value
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Removes `key`; removing a missing key is not an error
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

fn check_quota(limit: Option<usize>, key: &str, value: &str) -> Result<(), StorageError> {
    match limit {
        Some(limit) if value.len() > limit => Err(StorageError::QuotaExceeded {
            key: key.to_string(),
            size: value.len(),
            limit,
        }),
        _ => Ok(()),
    }
}

/// Stores each key as a file in a cache directory
///
/// Uses `~/.cache/smm-catalog/` on Linux, or the equivalent XDG path on other
/// platforms. The directory is created on first write.
#[derive(Debug, Clone)]
pub struct FileStore {
    /// Directory where values are stored
    dir: PathBuf,
    /// Largest value accepted, in bytes
    max_value_bytes: Option<usize>,
}

impl FileStore {
    /// Creates a FileStore in the XDG-compliant cache directory
    ///
    /// Returns `None` if the cache directory cannot be determined (e.g., no home directory).
    pub fn new() -> Option<Self> {
        let project_dirs = ProjectDirs::from("", "", "smm-catalog")?;
        Some(Self::with_dir(project_dirs.cache_dir().to_path_buf()))
    }

    /// Creates a FileStore in a custom directory
    pub fn with_dir(dir: PathBuf) -> Self {
        Self {
            dir,
            max_value_bytes: None,
        }
    }

    /// Caps the size of a single stored value
    pub fn with_max_value_bytes(mut self, limit: usize) -> Self {
        self.max_value_bytes = Some(limit);
        self
    }

    /// Directory the values live in
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the path to the file backing `key`
    fn value_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        match fs::read_to_string(self.value_path(key)) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        check_quota(self.max_value_bytes, key, value)?;
        fs::create_dir_all(&self.dir)?;

        // Write to a sibling file first so a crash never leaves half a value.
        let path = self.value_path(key);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        match fs::remove_file(self.value_path(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Keeps values in process memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
    max_value_bytes: Option<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Caps the size of a single stored value
    pub fn with_max_value_bytes(mut self, limit: usize) -> Self {
        self.max_value_bytes = Some(limit);
        self
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.values.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        check_quota(self.max_value_bytes, key, value)?;
        self.values
            .lock()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.values.lock().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_store() -> (FileStore, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = FileStore::with_dir(temp_dir.path().to_path_buf());
        (store, temp_dir)
    }

    #[test]
    fn test_set_creates_file_in_store_directory() {
        let (store, temp_dir) = create_test_store();

        store.set("smm_services_timestamp", "1700000000000").expect("Set should succeed");

        let expected_path = temp_dir.path().join("smm_services_timestamp.json");
        assert!(expected_path.exists(), "Value file should exist");
        let content = fs::read_to_string(&expected_path).expect("Should read file");
        assert_eq!(content, "1700000000000");
    }

    #[test]
    fn test_get_returns_none_for_missing_key() {
        let (store, _temp_dir) = create_test_store();
        assert!(store.get("nonexistent_key").unwrap().is_none());
    }

    #[test]
    fn test_set_then_get_returns_value() {
        let (store, _temp_dir) = create_test_store();
        store.set("key", "[1,2,3]").unwrap();
        assert_eq!(store.get("key").unwrap().as_deref(), Some("[1,2,3]"));
    }

    #[test]
    fn test_set_overwrites_existing_value() {
        let (store, _temp_dir) = create_test_store();
        store.set("key", "first").unwrap();
        store.set("key", "second").unwrap();
        assert_eq!(store.get("key").unwrap().as_deref(), Some("second"));
    }

    #[test]
    fn test_set_creates_directory_if_missing() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let nested_path = temp_dir.path().join("nested").join("cache").join("dir");
        let store = FileStore::with_dir(nested_path.clone());

        store.set("nested_key", "value").expect("Set should succeed");

        assert!(nested_path.exists(), "Nested directory should be created");
        assert!(nested_path.join("nested_key.json").exists());
    }

    #[test]
    fn test_remove_deletes_value_and_tolerates_missing() {
        let (store, _temp_dir) = create_test_store();
        store.set("key", "value").unwrap();
        store.remove("key").unwrap();
        assert!(store.get("key").unwrap().is_none());

        store.remove("key").expect("Removing a missing key should succeed");
    }

    #[test]
    fn test_file_store_quota_rejects_large_values() {
        let (store, temp_dir) = create_test_store();
        let store = store.with_max_value_bytes(4);

        let err = store.set("key", "too long").unwrap_err();
        assert!(matches!(err, StorageError::QuotaExceeded { size: 8, limit: 4, .. }));
        assert!(!temp_dir.path().join("key.json").exists());
    }

    #[test]
    fn test_new_creates_xdg_compliant_path() {
        if let Some(store) = FileStore::new() {
            let path_str = store.dir().to_string_lossy();
            assert!(
                path_str.contains("smm-catalog"),
                "Cache path should contain project name"
            );
        }
        // Test passes if new() returns None (e.g., no home directory in CI)
    }

    #[test]
    fn test_memory_store_round_trip() {
        let store = MemoryStore::new();
        assert!(store.get("key").unwrap().is_none());
        store.set("key", "value").unwrap();
        assert_eq!(store.get("key").unwrap().as_deref(), Some("value"));
        store.remove("key").unwrap();
        assert!(store.get("key").unwrap().is_none());
    }

    #[test]
    fn test_memory_store_quota() {
        let store = MemoryStore::new().with_max_value_bytes(3);
        assert!(store.set("key", "abc").is_ok());
        assert!(matches!(
            store.set("key", "abcd"),
            Err(StorageError::QuotaExceeded { .. })
        ));
        assert_eq!(store.get("key").unwrap().as_deref(), Some("abc"));
    }
}
