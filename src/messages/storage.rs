//! Durable key/value slots for session state
//!
//! Each key holds one serialized JSON document. The session keeps its history
//! and its context window under separate keys so they can be cleared
//! independently.

use crate::{ParleyError, Result};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Key holding the serialized conversation history
pub const HISTORY_KEY: &str = "chat_messages";

/// Key holding the serialized context window
pub const CONTEXT_KEY: &str = "ai_chat_context";

/// A durable string store scoped to the local client
pub trait Storage: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;

    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Removing a missing key is not an error
    fn remove(&self, key: &str) -> Result<()>;
}

/// Process-local storage, used in tests and for throwaway sessions
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    entries: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries.write().remove(key);
        Ok(())
    }
}

/// Stores each key as `<dir>/<key>.json`
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Open (and create if needed) a storage directory
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| {
            ParleyError::Storage(format!("Failed to create {}: {}", dir.display(), e))
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(ParleyError::Storage(format!("Invalid storage key: {:?}", key)));
        }
        Ok(self.dir.join(format!("{}.json", key)))
    }
}

impl Storage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key)?;
        match fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ParleyError::Storage(format!(
                "Failed to read {}: {}",
                path.display(),
                e
            ))),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key)?;
        // Write then rename so a crash never leaves a half-written document
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value).map_err(|e| {
            ParleyError::Storage(format!("Failed to write {}: {}", tmp.display(), e))
        })?;
        fs::rename(&tmp, &path).map_err(|e| {
            ParleyError::Storage(format!("Failed to replace {}: {}", path.display(), e))
        })
    }

    fn remove(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ParleyError::Storage(format!(
                "Failed to remove {}: {}",
                path.display(),
                e
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_memory_storage_roundtrip() {
        let storage = MemoryStorage::new();
        assert_eq!(storage.get("a").unwrap(), None);

        storage.set("a", "[1]").unwrap();
        assert_eq!(storage.get("a").unwrap().as_deref(), Some("[1]"));
        assert_eq!(storage.len(), 1);

        storage.remove("a").unwrap();
        storage.remove("a").unwrap();
        assert!(storage.is_empty());
    }

    #[test]
    fn test_memory_storage_clones_share_entries() {
        let storage = MemoryStorage::new();
        let other = storage.clone();
        storage.set(CONTEXT_KEY, "[]").unwrap();
        assert_eq!(other.get(CONTEXT_KEY).unwrap().as_deref(), Some("[]"));
    }

    #[test]
    fn test_file_storage_persists_across_instances() {
        let tmp = TempDir::new().unwrap();
        let storage = FileStorage::open(tmp.path().join("session")).unwrap();
        storage.set(HISTORY_KEY, r#"[{"x":1}]"#).unwrap();

        let reopened = FileStorage::open(tmp.path().join("session")).unwrap();
        assert_eq!(
            reopened.get(HISTORY_KEY).unwrap().as_deref(),
            Some(r#"[{"x":1}]"#)
        );
        assert!(tmp.path().join("session").join("chat_messages.json").exists());
    }

    #[test]
    fn test_file_storage_remove_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let storage = FileStorage::open(tmp.path()).unwrap();
        storage.set(CONTEXT_KEY, "[]").unwrap();
        storage.remove(CONTEXT_KEY).unwrap();
        storage.remove(CONTEXT_KEY).unwrap();
        assert_eq!(storage.get(CONTEXT_KEY).unwrap(), None);
    }

    #[test]
    fn test_file_storage_rejects_path_like_keys() {
        let tmp = TempDir::new().unwrap();
        let storage = FileStorage::open(tmp.path()).unwrap();
        assert!(matches!(
            storage.set("../escape", "x"),
            Err(ParleyError::Storage(_))
        ));
        assert!(storage.get("").is_err());
    }
}
