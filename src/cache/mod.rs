//! Categorized on-disk JSON cache.
//!
//! Each entry is one JSON document at a path derived from three parts:
//!
//! ```text
//! <root for category>/[group/]name.json
//! ```
//!
//! | Category | Durability | Default root |
//! |----------|------------|--------------|
//! | [`Category::Cache`] | May be purged by the OS | `dirs::cache_dir()/<app>` |
//! | [`Category::Data`] | Kept until deleted | `dirs::data_dir()/<app>` |
//!
//! The store never reports I/O or schema failures as errors. Reads return
//! `None`, writes and deletes return `false`, and the failure is logged.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `keyed` | [`KeyedCache`], a typed view over one group |
//! | `store` | [`CacheStore`] |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

// ============================================================================
// Submodules
// ============================================================================

/// Typed keyed view over one cache group.
pub mod keyed;

/// Cache store implementation.
pub mod store;

// ============================================================================
// Re-exports
// ============================================================================

pub use keyed::KeyedCache;
pub use store::CacheStore;

// ============================================================================
// Category
// ============================================================================

/// Durability class of a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    /// Re-fetchable data; the OS may purge it.
    Cache,
    /// Data that must survive until explicitly deleted.
    Data,
}

impl Category {
    /// Returns the lowercase name.
    #[inline]
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Cache => "cache",
            Self::Data => "data",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// CachePaths
// ============================================================================

/// Root directory for each category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachePaths {
    cache: PathBuf,
    data: PathBuf,
}

impl CachePaths {
    /// Creates paths with explicit roots.
    #[must_use]
    pub fn new(cache: impl Into<PathBuf>, data: impl Into<PathBuf>) -> Self {
        Self {
            cache: cache.into(),
            data: data.into(),
        }
    }

    /// Places both categories under one directory, as `cache/` and `data/`.
    #[must_use]
    pub fn under(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self::new(
            root.join(Category::Cache.as_str()),
            root.join(Category::Data.as_str()),
        )
    }

    /// Resolves the platform directories for `app_name`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the platform has no cache or data
    /// directory.
    pub fn for_app(app_name: &str) -> Result<Self> {
        let cache = dirs::cache_dir()
            .ok_or_else(|| Error::config("no platform cache directory"))?;
        let data = dirs::data_dir().ok_or_else(|| Error::config("no platform data directory"))?;
        Ok(Self::new(cache.join(app_name), data.join(app_name)))
    }

    /// Returns the root for `category`.
    #[inline]
    #[must_use]
    pub fn root(&self, category: Category) -> &Path {
        match category {
            Category::Cache => &self.cache,
            Category::Data => &self.data,
        }
    }

    /// Returns the directory holding `group` (or the root if `None`).
    ///
    /// Returns `None` if `group` is not a valid path component.
    #[must_use]
    pub fn dir(&self, category: Category, group: Option<&str>) -> Option<PathBuf> {
        let root = self.root(category);
        match group {
            Some(group) if is_valid_component(group) => Some(root.join(group)),
            Some(_) => None,
            None => Some(root.to_path_buf()),
        }
    }

    /// Returns the file path of an entry.
    ///
    /// Returns `None` if `group` or `name` is not a valid path component.
    #[must_use]
    pub fn entry(&self, category: Category, group: Option<&str>, name: &str) -> Option<PathBuf> {
        if !is_valid_component(name) {
            return None;
        }
        self.dir(category, group)
            .map(|dir| dir.join(format!("{name}.json")))
    }
}

/// Returns `true` if `part` is usable as a single path component.
fn is_valid_component(part: &str) -> bool {
    !part.is_empty()
        && part != "."
        && part != ".."
        && !part.contains(['/', '\\', '\0'])
}

// ============================================================================
// Tests
// ============================================================================
