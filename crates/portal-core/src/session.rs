//! Durable per-tab session identity.
//!
//! The identifier is created once and kept in storage whose lifetime matches
//! the browser tab: it survives reloads but not closing the tab. For the
//! headless client a [`FileStorage`] plays the tab, and deleting its file is
//! closing the tab.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::StorageError;
use crate::ids::SessionId;

/// Namespaced storage key of the session identifier.
pub const SESSION_ID_KEY: &str = "org.jgrapes.portal.sessionId";

/// Tab-scoped key-value storage.
pub trait SessionStorage: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
}

/// Storage that lives as long as the value holding it.
#[derive(Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let _ = self.entries.lock().insert(key.to_owned(), value.to_owned());
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredEntry {
    value: String,
    stored_at: DateTime<Utc>,
}

/// JSON file backed storage.
pub struct FileStorage {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_entries(&self) -> Result<HashMap<String, StoredEntry>, StorageError> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(e.into()),
        }
    }
}

impl SessionStorage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let _guard = self.lock.lock();
        Ok(self.read_entries()?.remove(key).map(|entry| entry.value))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let _guard = self.lock.lock();
        let mut entries = match self.read_entries() {
            Ok(entries) => entries,
            Err(StorageError::Corrupt(e)) => {
                warn!(path = %self.path.display(), error = %e, "replacing corrupt storage file");
                HashMap::new()
            }
            Err(e) => return Err(e),
        };
        let _ = entries.insert(
            key.to_owned(),
            StoredEntry {
                value: value.to_owned(),
                stored_at: Utc::now(),
            },
        );
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_vec_pretty(&entries)?)?;
        Ok(())
    }
}

/// Obtains the session identifier of this tab.
pub struct SessionIdentity;

impl SessionIdentity {
    /// Return the stored identifier, creating and storing one on first use.
    ///
    /// Storage failures never surface: the identifier is then generated for
    /// this call only and continuity across reloads is lost.
    pub fn get_or_create(storage: &dyn SessionStorage) -> SessionId {
        match storage.get(SESSION_ID_KEY) {
            Ok(Some(stored)) if !stored.is_empty() => {
                debug!(session_id = %stored, "reusing stored session id");
                return SessionId::from_raw(stored);
            }
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "session storage unavailable, using ephemeral session id");
                return SessionId::generate();
            }
        }

        let id = SessionId::generate();
        if let Err(e) = storage.set(SESSION_ID_KEY, id.as_str()) {
            warn!(error = %e, session_id = %id, "failed to persist session id");
        }
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BrokenStorage;

    impl SessionStorage for BrokenStorage {
        fn get(&self, _key: &str) -> Result<Option<String>, StorageError> {
            Err(StorageError::Unavailable("disabled".into()))
        }

        fn set(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
            Err(StorageError::Unavailable("disabled".into()))
        }
    }

    struct ReadOnlyStorage;

    impl SessionStorage for ReadOnlyStorage {
        fn get(&self, _key: &str) -> Result<Option<String>, StorageError> {
            Ok(None)
        }

        fn set(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
            Err(StorageError::Unavailable("quota exceeded".into()))
        }
    }

    #[test]
    fn first_call_creates_and_persists() {
        let storage = MemoryStorage::new();
        let id = SessionIdentity::get_or_create(&storage);
        assert_eq!(storage.get(SESSION_ID_KEY).unwrap().as_deref(), Some(id.as_str()));
    }

    #[test]
    fn later_calls_return_same_id() {
        let storage = MemoryStorage::new();
        let first = SessionIdentity::get_or_create(&storage);
        let second = SessionIdentity::get_or_create(&storage);
        assert_eq!(first, second);
    }

    #[test]
    fn unavailable_storage_yields_fresh_ids() {
        let a = SessionIdentity::get_or_create(&BrokenStorage);
        let b = SessionIdentity::get_or_create(&BrokenStorage);
        assert_ne!(a, b);
    }

    #[test]
    fn unwritable_storage_still_returns_id() {
        let id = SessionIdentity::get_or_create(&ReadOnlyStorage);
        assert!(!id.as_str().is_empty());
    }

    #[test]
    fn file_storage_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tab").join("session.json");

        let first = SessionIdentity::get_or_create(&FileStorage::new(&path));
        let second = SessionIdentity::get_or_create(&FileStorage::new(&path));
        assert_eq!(first, second);
    }

    #[test]
    fn deleting_file_starts_new_session() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        let first = SessionIdentity::get_or_create(&FileStorage::new(&path));
        std::fs::remove_file(&path).unwrap();
        let second = SessionIdentity::get_or_create(&FileStorage::new(&path));
        assert_ne!(first, second);
    }

    #[test]
    fn corrupt_file_reports_error_then_recovers_on_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, "{not json").unwrap();
        let storage = FileStorage::new(&path);

        assert!(matches!(storage.get(SESSION_ID_KEY), Err(StorageError::Corrupt(_))));
        storage.set(SESSION_ID_KEY, "S1").unwrap();
        assert_eq!(storage.get(SESSION_ID_KEY).unwrap().as_deref(), Some("S1"));
    }
}
