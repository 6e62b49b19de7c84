//! Durable key/value state
//!
//! The SDK keeps its crash-surviving state (queue snapshot, session and
//! identity entries) behind a small key/value contract. Any backend works
//! as long as it can load and replace whole values: a JSON file, an embedded
//! key/value store, or a platform secure-storage wrapper.
//!
//! Writes are best effort. A failed write is logged and the in-memory copy
//! stays authoritative for the current process lifetime; the data just is
//! not guaranteed to survive a crash.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{Error, Result};

/// Well-known state keys
pub mod keys {
    /// Serialized queue snapshot (JSON array of envelopes)
    pub const QUEUE: &str = "queue";
    /// Per-install anonymous identifier
    pub const ANONYMOUS_ID: &str = "anonymous_id";
    /// Current session identifier
    pub const SESSION_ID: &str = "session_id";
    /// Authenticated user identifier
    pub const USER_ID: &str = "user_id";
}

/// Durable key/value storage contract
pub trait StateStore: Send + Sync {
    /// Load the value stored under `key`, if any
    fn load(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` under `key`, replacing any previous value
    fn store(&self, key: &str, value: &str) -> Result<()>;

    /// Remove the value stored under `key`
    fn remove(&self, key: &str) -> Result<()>;
}

/// File-backed state store
///
/// Holds all entries in one JSON document and rewrites it atomically
/// (write-to-temp then rename) on every mutation.
pub struct FileStateStore {
    path: PathBuf,
    entries: Mutex<HashMap<String, String>>,
}

impl FileStateStore {
    /// Open the store at `path`, creating parent directories as needed.
    ///
    /// An unreadable or corrupt file is logged and treated as empty rather
    /// than failing init.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let entries = match std::fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Corrupt state file, starting empty");
                    HashMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path: path.to_path_buf(),
            entries: Mutex::new(entries),
        })
    }

    fn flush(&self, entries: &HashMap<String, String>) -> Result<()> {
        let content = serde_json::to_string(entries)?;
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl StateStore for FileStateStore {
    fn load(&self, key: &str) -> Result<Option<String>> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| Error::State("state lock poisoned".to_string()))?;
        Ok(entries.get(key).cloned())
    }

    fn store(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| Error::State("state lock poisoned".to_string()))?;
        entries.insert(key.to_string(), value.to_string());
        self.flush(&entries)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| Error::State("state lock poisoned".to_string()))?;
        entries.remove(key);
        self.flush(&entries)
    }
}

/// In-memory state store (for tests and ephemeral hosts)
#[derive(Default)]
pub struct MemoryStateStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStateStore {
    fn load(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.lock().unwrap().get(key).cloned())
    }

    fn store(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }
}
