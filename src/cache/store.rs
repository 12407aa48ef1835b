//! Cache store.
//!
//! All file system work runs on the blocking pool. Writes stage into a
//! temporary file in the target directory and rename it into place, so a
//! reader sees either the previous document or the new one, never a prefix.

// ============================================================================
// Imports
// ============================================================================

use std::fs;
use std::io::{self, ErrorKind, Write as _};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use serde::Serialize;
use serde::de::{DeserializeOwned, IgnoredAny};
use tempfile::NamedTempFile;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};

use super::{CachePaths, Category};

// ============================================================================
// CacheStore
// ============================================================================

/// Categorized key/value JSON persistence.
///
/// Cloning shares the same roots.
#[derive(Debug, Clone)]
pub struct CacheStore {
    paths: Arc<CachePaths>,
}

impl CacheStore {
    /// Creates a store over `paths`. Directories are created on first write.
    #[must_use]
    pub fn new(paths: CachePaths) -> Self {
        Self {
            paths: Arc::new(paths),
        }
    }

    /// Returns the category roots.
    #[inline]
    #[must_use]
    pub fn paths(&self) -> &CachePaths {
        &self.paths
    }

    /// Serializes `value` and writes it.
    ///
    /// Returns `false` if the key is invalid, serialization fails, or the
    /// file cannot be written.
    pub async fn write<T: Serialize + ?Sized>(
        &self,
        category: Category,
        group: Option<&str>,
        name: &str,
        value: &T,
    ) -> bool {
        match serde_json::to_vec(value) {
            Ok(bytes) => self.write_bytes(category, group, name, bytes).await,
            Err(e) => {
                warn!(%category, group, name, error = %e, "Cache value not serializable");
                false
            }
        }
    }

    /// Writes an already-serialized JSON document.
    ///
    /// Returns `false` if `json` is not valid JSON or the write fails.
    pub async fn write_raw(
        &self,
        category: Category,
        group: Option<&str>,
        name: &str,
        json: impl Into<String>,
    ) -> bool {
        let json = json.into();
        if let Err(e) = serde_json::from_str::<IgnoredAny>(&json) {
            warn!(%category, group, name, error = %e, "Refusing to cache invalid JSON");
            return false;
        }
        self.write_bytes(category, group, name, json.into_bytes())
            .await
    }

    /// Reads and deserializes an entry.
    ///
    /// A missing file, an unreadable file and a document that does not
    /// match `T` all return `None`.
    pub async fn read<T>(&self, category: Category, group: Option<&str>, name: &str) -> Option<T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let path = self.entry_path(category, group, name)?;
        let target = path.clone();

        match blocking(move || read_json::<T>(&target)).await {
            Ok(value) => {
                trace!(path = %path.display(), "Cache hit");
                Some(value)
            }
            Err(Error::Io(e)) if e.kind() == ErrorKind::NotFound => {
                trace!(path = %path.display(), "Cache miss");
                None
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Cache entry unreadable, treating as miss");
                None
            }
        }
    }

    /// Returns when an entry was last written, if it exists.
    pub async fn modified_at(
        &self,
        category: Category,
        group: Option<&str>,
        name: &str,
    ) -> Option<SystemTime> {
        let path = self.entry_path(category, group, name)?;
        blocking(move || Ok(fs::metadata(&path)?.modified()?))
            .await
            .ok()
    }

    /// Deletes an entry.
    ///
    /// Returns `false` if the entry does not exist or cannot be removed.
    pub async fn delete(&self, category: Category, group: Option<&str>, name: &str) -> bool {
        let Some(path) = self.entry_path(category, group, name) else {
            return false;
        };
        let target = path.clone();

        match blocking(move || fs::remove_file(&target).map_err(Error::from)).await {
            Ok(()) => {
                debug!(path = %path.display(), "Cache entry deleted");
                true
            }
            Err(Error::Io(e)) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "Cache entry to delete does not exist");
                false
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Cache entry delete failed");
                false
            }
        }
    }

    /// Deletes every entry in a group whose value is stale.
    ///
    /// Only entries whose name starts with `key_prefix` (if given) are
    /// considered. Entries that do not decode as `T` are left alone.
    /// Returns the number of entries deleted.
    pub async fn delete_stale<T, F>(
        &self,
        category: Category,
        group: Option<&str>,
        key_prefix: Option<&str>,
        is_stale: F,
    ) -> usize
    where
        T: DeserializeOwned + 'static,
        F: Fn(&T) -> bool + Send + 'static,
    {
        let Some(dir) = self.paths.dir(category, group) else {
            warn!(%category, group, "Invalid cache group");
            return 0;
        };
        let prefix = key_prefix.map(str::to_string);
        let target = dir.clone();

        match blocking(move || sweep_stale::<T, F>(&target, prefix.as_deref(), &is_stale)).await {
            Ok(deleted) => {
                if deleted > 0 {
                    debug!(dir = %dir.display(), deleted, "Stale cache entries deleted");
                }
                deleted
            }
            Err(Error::Io(e)) if e.kind() == ErrorKind::NotFound => 0,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "Stale cache sweep failed");
                0
            }
        }
    }

    fn entry_path(&self, category: Category, group: Option<&str>, name: &str) -> Option<PathBuf> {
        let path = self.paths.entry(category, group, name);
        if path.is_none() {
            warn!(%category, group, name, "Invalid cache key");
        }
        path
    }

    async fn write_bytes(
        &self,
        category: Category,
        group: Option<&str>,
        name: &str,
        bytes: Vec<u8>,
    ) -> bool {
        let Some(path) = self.entry_path(category, group, name) else {
            return false;
        };
        let target = path.clone();

        match blocking(move || atomic_write(&target, &bytes)).await {
            Ok(()) => {
                trace!(path = %path.display(), "Cache entry written");
                true
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Cache write failed");
                false
            }
        }
    }
}

// ============================================================================
// Blocking Helpers
// ============================================================================

/// Runs `f` on the blocking pool.
async fn blocking<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::Io(io::Error::other(e)))?
}

/// Stages `data` next to `path` and renames it into place.
fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| Error::Io(io::Error::other("cache path has no parent directory")))?;
    fs::create_dir_all(dir)?;

    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(data)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| Error::Io(e.error))?;
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

fn sweep_stale<T, F>(dir: &Path, prefix: Option<&str>, is_stale: &F) -> Result<usize>
where
    T: DeserializeOwned,
    F: Fn(&T) -> bool,
{
    let mut deleted = 0;

    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
            continue;
        }

        let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
            continue;
        };
        if prefix.is_some_and(|prefix| !stem.starts_with(prefix)) {
            continue;
        }

        let Ok(value) = read_json::<T>(&path) else {
            continue;
        };
        if !is_stale(&value) {
            continue;
        }

        match fs::remove_file(&path) {
            Ok(()) => deleted += 1,
            Err(e) => warn!(path = %path.display(), error = %e, "Stale cache entry delete failed"),
        }
    }

    Ok(deleted)
}

// ============================================================================
// Tests
// ============================================================================
