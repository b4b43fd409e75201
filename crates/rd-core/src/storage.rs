//! Local key/value persistence for authentication material.
//!
//! Only the auth container writes here; the event hub and the HTTP gateway
//! read the access token from it at connect/request time.

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

pub const KEY_AUTH_TOKEN: &str = "auth_token";
pub const KEY_TOKEN_TYPE: &str = "token_type";
pub const KEY_TOKEN_EXPIRY: &str = "token_expiry";
pub const KEY_USER: &str = "user";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// String key/value store.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: &str) -> StorageResult<()>;

    fn remove(&self, key: &str) -> StorageResult<()>;
}

/// Volatile store, used in tests and when no storage path is configured.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: RwLock<BTreeMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        self.entries
            .write()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        self.entries.write().remove(key);
        Ok(())
    }
}

/// Store backed by a single JSON object file.
///
/// The whole file is rewritten on every change. A missing file is an empty
/// store; it is created (with parent directories) on first write.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    entries: RwLock<BTreeMap<String, String>>,
}

impl FileStorage {
    /// Open the store at `path`, loading existing entries.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = match std::fs::read_to_string(&path) {
            Ok(content) if content.trim().is_empty() => BTreeMap::new(),
            Ok(content) => serde_json::from_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        debug!(path = %path.display(), keys = entries.len(), "Opened local storage");

        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, entries: &BTreeMap<String, String>) -> StorageResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let content = serde_json::to_string_pretty(entries)?;
        std::fs::write(&self.path, content)?;
        Ok(())
    }
}

impl KeyValueStore for FileStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        let mut entries = self.entries.write();
        let mut staged = entries.clone();
        staged.insert(key.to_string(), value.to_string());
        self.flush(&staged)?;
        *entries = staged;
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        let mut entries = self.entries.write();
        if !entries.contains_key(key) {
            return Ok(());
        }
        let mut staged = entries.clone();
        staged.remove(key);
        self.flush(&staged).map_err(|e| {
            warn!(error = %e, key, "Failed to persist key removal");
            e
        })?;
        *entries = staged;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path() -> PathBuf {
        std::env::temp_dir()
            .join(format!("rd-storage-{}", uuid::Uuid::new_v4()))
            .join("storage.json")
    }

    #[test]
    fn test_memory_storage() {
        let storage = MemoryStorage::new();
        assert_eq!(storage.get(KEY_AUTH_TOKEN), None);
        storage.set(KEY_AUTH_TOKEN, "abc").unwrap();
        assert_eq!(storage.get(KEY_AUTH_TOKEN).as_deref(), Some("abc"));
        storage.remove(KEY_AUTH_TOKEN).unwrap();
        assert_eq!(storage.get(KEY_AUTH_TOKEN), None);
    }

    #[test]
    fn test_failed_write_leaves_entries_unchanged() {
        let path = temp_path();
        let storage = FileStorage::open(&path).unwrap();
        storage.set(KEY_AUTH_TOKEN, "abc").unwrap();

        // A directory in place of the file makes every flush fail
        std::fs::remove_file(&path).unwrap();
        std::fs::create_dir_all(&path).unwrap();

        assert!(storage.set(KEY_TOKEN_TYPE, "Bearer").is_err());
        assert_eq!(storage.get(KEY_TOKEN_TYPE), None);
        assert!(storage.remove(KEY_AUTH_TOKEN).is_err());
        assert_eq!(storage.get(KEY_AUTH_TOKEN).as_deref(), Some("abc"));

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_file_storage_persists_across_reopen() {
        let path = temp_path();
        {
            let storage = FileStorage::open(&path).unwrap();
            storage.set(KEY_AUTH_TOKEN, "abc").unwrap();
            storage.set(KEY_TOKEN_TYPE, "Bearer").unwrap();
            storage.remove(KEY_TOKEN_TYPE).unwrap();
        }

        let reopened = FileStorage::open(&path).unwrap();
        assert_eq!(reopened.get(KEY_AUTH_TOKEN).as_deref(), Some("abc"));
        assert_eq!(reopened.get(KEY_TOKEN_TYPE), None);

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_file_storage_missing_file_is_empty() {
        let storage = FileStorage::open(temp_path()).unwrap();
        assert_eq!(storage.get(KEY_USER), None);
        // Removing an absent key never touches the disk
        storage.remove(KEY_USER).unwrap();
    }
}
