//! Durable key-value storage and the snapshot cache built on it
//!
//! `Storage` is the local-storage equivalent: one string value per key. The
//! snapshot cache keeps the normalized snapshot (not the raw upstream shape)
//! under a single key, read once at startup and overwritten after every
//! successful refresh.

use crate::{constants::SNAPSHOT_CACHE_KEY, error::CacheError, types::MarketSnapshot};
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// String-valued durable storage
pub trait Storage: Send + Sync {
    /// Returns the stored value, or `None` if the key was never written
    fn read(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Replaces the value under `key`
    fn write(&self, key: &str, value: &str) -> Result<(), CacheError>;
}

/// One JSON file per key inside a directory
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let file: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.json", file))
    }
}

impl Storage for FileStorage {
    fn read(&self, key: &str) -> Result<Option<String>, CacheError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, key: &str, value: &str) -> Result<(), CacheError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(key);
        // Write-then-rename so a crash never leaves a half-written file behind.
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}

/// Process-local storage, for tests and embedders without a filesystem
#[derive(Debug, Default, Clone)]
pub struct MemoryStorage {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn read(&self, key: &str) -> Result<Option<String>, CacheError> {
        let entries = self
            .entries
            .lock()
            .map_err(|e| CacheError::Io(std::io::Error::other(e.to_string())))?;
        Ok(entries.get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<(), CacheError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| CacheError::Io(std::io::Error::other(e.to_string())))?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Durable mirror of the last good snapshot
#[derive(Clone)]
pub struct SnapshotCache {
    storage: Arc<dyn Storage>,
    key: String,
}

impl SnapshotCache {
    /// Cache under the default key
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self::with_key(storage, SNAPSHOT_CACHE_KEY)
    }

    pub fn with_key(storage: Arc<dyn Storage>, key: impl Into<String>) -> Self {
        Self {
            storage,
            key: key.into(),
        }
    }

    /// Reads the cached snapshot
    ///
    /// A missing, unreadable, or corrupt entry yields `None`; the controller
    /// then starts empty and the next successful refresh overwrites it.
    pub fn load(&self) -> Option<MarketSnapshot> {
        let raw = match self.storage.read(&self.key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(key = %self.key, error = %e, "Failed to read snapshot cache");
                return None;
            }
        };

        match serde_json::from_str::<MarketSnapshot>(&raw) {
            Ok(snapshot) => {
                tracing::debug!(key = %self.key, pairs = snapshot.len(), "Loaded cached snapshot");
                Some(snapshot)
            }
            Err(e) => {
                tracing::warn!(key = %self.key, error = %e, "Discarding corrupt snapshot cache");
                None
            }
        }
    }

    /// Overwrites the cached snapshot
    ///
    /// Synchronous: with `FileStorage` this is a blocking write and rename on
    /// the calling thread. Snapshots are a single small JSON document, so the
    /// controller calls it inline from its async refresh.
    pub fn save(&self, snapshot: &MarketSnapshot) -> Result<(), CacheError> {
        let raw = serde_json::to_string(snapshot)?;
        self.storage.write(&self.key, &raw)
    }
}
