//! Client-local persistence of access grants, one entry per premiere.
//!
//! This is a convenience shortcut for returning visitors, not a security boundary: anyone able
//! to edit the file can forge an entry.

use std::{
    collections::{BTreeMap, HashMap},
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::{Mutex, PoisonError},
};

use thiserror::Error;
use tracing::{info, warn};

/// Failures raised while persisting a grant.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("failed to write access cache `{path}`")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize access cache")]
    Serialize(#[source] serde_json::Error),
}

/// Key under which the granted email of `premiere_id` is stored.
pub fn cache_key(premiere_id: &str) -> String {
    format!("premiere_{premiere_id}_email")
}

/// Key/value storage surviving between visits.
pub trait AccessCache: Send + Sync {
    /// Email previously granted access to `premiere_id`, if any.
    fn load(&self, premiere_id: &str) -> Option<String>;
    /// Remember that `email` was granted access to `premiere_id`.
    fn store(&self, premiere_id: &str, email: &str) -> Result<(), CacheError>;
}

/// Cache that forgets everything when the process exits.
#[derive(Debug, Default)]
pub struct MemoryAccessCache {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryAccessCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }
}

impl AccessCache for MemoryAccessCache {
    fn load(&self, premiere_id: &str) -> Option<String> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.get(&cache_key(premiere_id)).cloned()
    }

    fn store(&self, premiere_id: &str, email: &str) -> Result<(), CacheError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(cache_key(premiere_id), email.to_string());
        Ok(())
    }
}

/// Cache persisted as a flat JSON object on disk.
#[derive(Debug)]
pub struct FileAccessCache {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileAccessCache {
    /// Open the cache at `path`, starting empty when the file is missing or unreadable.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = read_entries(&path);
        Self {
            path,
            entries: Mutex::new(entries),
        }
    }

    /// Location of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, entries: &BTreeMap<String, String>) -> Result<(), CacheError> {
        let contents = serde_json::to_vec_pretty(entries).map_err(CacheError::Serialize)?;
        let io_err = |source| CacheError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let staging = self.path.with_extension("tmp");
        fs::write(&staging, contents).map_err(io_err)?;
        fs::rename(&staging, &self.path).map_err(io_err)
    }
}

impl AccessCache for FileAccessCache {
    fn load(&self, premiere_id: &str) -> Option<String> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.get(&cache_key(premiere_id)).cloned()
    }

    fn store(&self, premiere_id: &str, email: &str) -> Result<(), CacheError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let previous = entries.insert(cache_key(premiere_id), email.to_string());
        if let Err(err) = self.persist(&entries) {
            // Keep memory and disk in agreement.
            match previous {
                Some(previous) => entries.insert(cache_key(premiere_id), previous),
                None => entries.remove(&cache_key(premiere_id)),
            };
            return Err(err);
        }
        Ok(())
    }
}

fn read_entries(path: &Path) -> BTreeMap<String, String> {
    match fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str(&contents) {
            Ok(entries) => entries,
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to parse access cache; starting empty"
                );
                BTreeMap::new()
            }
        },
        Err(err) if err.kind() == ErrorKind::NotFound => {
            info!(path = %path.display(), "access cache not found; starting empty");
            BTreeMap::new()
        }
        Err(err) => {
            warn!(
                path = %path.display(),
                error = %err,
                "failed to read access cache; starting empty"
            );
            BTreeMap::new()
        }
    }
}
