//! Key-value storage areas backing the credential store.
//!
//! A storage area behaves like a browser's web storage: string keys, string
//! values, synchronous access. Reads never fail; an unreadable value is
//! logged and reported as absent so callers degrade to an anonymous session.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use keyring::Entry;
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to access credential file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode credential file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Keychain error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("Keychain did not keep the value for {key}")]
    NotPersisted { key: String },
}

/// A string key-value persistence area.
pub trait StorageArea: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Remove a key. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

impl<T: StorageArea + ?Sized> StorageArea for Arc<T> {
    fn get(&self, key: &str) -> Option<String> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        (**self).remove(key)
    }
}

// ============================================================================
// MemoryArea
// ============================================================================

/// In-process storage. Everything is gone when the process exits, which
/// makes it the session-scoped area.
#[derive(Debug, Default)]
pub struct MemoryArea {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryArea {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every entry, as if the session had ended.
    pub fn wipe(&self) {
        self.entries.lock().clear();
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl StorageArea for MemoryArea {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

// ============================================================================
// FileArea
// ============================================================================

/// Durable storage in a single JSON object file.
///
/// Every operation re-reads the file so separate invocations of the CLI see
/// each other's writes. The lock only serializes access within this process.
pub struct FileArea {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileArea {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<HashMap<String, String>, StorageError> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }
        let contents = std::fs::read_to_string(&self.path).map_err(|source| StorageError::Io {
            path: self.path.clone(),
            source,
        })?;
        Ok(serde_json::from_str(&contents)?)
    }

    fn persist(&self, entries: &HashMap<String, String>) -> Result<(), StorageError> {
        let io_err = |source| StorageError::Io {
            path: self.path.clone(),
            source,
        };

        if entries.is_empty() {
            if self.path.exists() {
                std::fs::remove_file(&self.path).map_err(io_err)?;
            }
            return Ok(());
        }

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let contents = serde_json::to_string_pretty(entries)?;

        // Readers only ever see a complete file
        let tmp_path = self.tmp_path();
        let written = std::fs::write(&tmp_path, contents)
            .and_then(|()| std::fs::rename(&tmp_path, &self.path));
        if let Err(e) = written {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(io_err(e));
        }
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl StorageArea for FileArea {
    fn get(&self, key: &str) -> Option<String> {
        let _guard = self.lock.lock();
        match self.load() {
            Ok(mut entries) => entries.remove(key),
            Err(e) => {
                warn!(error = %e, key, "Unreadable credential file, treating as empty");
                None
            }
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let _guard = self.lock.lock();
        // A corrupt file is replaced rather than blocking new credentials
        let mut entries = self.load().unwrap_or_else(|e| {
            warn!(error = %e, "Discarding unreadable credential file");
            HashMap::new()
        });
        entries.insert(key.to_string(), value.to_string());
        self.persist(&entries)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let _guard = self.lock.lock();
        let mut entries = match self.load() {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "Discarding unreadable credential file");
                HashMap::new()
            }
        };
        entries.remove(key);
        self.persist(&entries)
    }
}

// ============================================================================
// KeyringArea
// ============================================================================

/// Durable storage in the OS keychain, one entry per key.
pub struct KeyringArea {
    service: String,
}

impl KeyringArea {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, key: &str) -> Result<Entry, StorageError> {
        Ok(Entry::new(&self.service, key)?)
    }
}

impl StorageArea for KeyringArea {
    fn get(&self, key: &str) -> Option<String> {
        let entry = match self.entry(key) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, key, "Failed to open keychain entry");
                return None;
            }
        };
        match entry.get_password() {
            Ok(value) => Some(value),
            Err(keyring::Error::NoEntry) => None,
            Err(e) => {
                warn!(error = %e, key, "Failed to read keychain entry");
                None
            }
        }
    }

    /// Store `value`, then read it back through a fresh entry. A backend
    /// that accepts the write but forgets it is reported as an error.
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entry(key)?.set_password(value)?;

        match self.entry(key)?.get_password() {
            Ok(stored) if stored == value => Ok(()),
            Ok(_) | Err(keyring::Error::NoEntry) => {
                warn!(key, "Keychain write was not kept");
                Err(StorageError::NotPersisted { key: key.to_string() })
            }
            Err(e) => Err(e.into()),
        }
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        match self.entry(key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => {
                debug!(error = %e, key, "Keychain delete failed");
                Err(e.into())
            }
        }
    }
}
