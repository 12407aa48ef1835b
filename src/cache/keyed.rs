//! Typed keyed view over one cache group.

use std::fmt;
use std::marker::PhantomData;

use serde::Serialize;
use serde::de::DeserializeOwned;

use super::{CacheStore, Category};

/// Entries of one type, stored as `cache/<group>/<prefix>-<key>.json`.
///
/// The group must be unique per entry type: [`KeyedCache::delete_stale_entries`]
/// decodes every file in the group whose name carries the prefix.
pub struct KeyedCache<T> {
    store: CacheStore,
    group: String,
    key_prefix: String,
    _entry: PhantomData<fn() -> T>,
}

impl<T> fmt::Debug for KeyedCache<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyedCache")
            .field("group", &self.group)
            .field("key_prefix", &self.key_prefix)
            .finish_non_exhaustive()
    }
}

impl<T> Clone for KeyedCache<T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            group: self.group.clone(),
            key_prefix: self.key_prefix.clone(),
            _entry: PhantomData,
        }
    }
}

impl<T> KeyedCache<T>
where
    T: Serialize + DeserializeOwned + Send + 'static,
{
    #[must_use]
    pub fn new(store: CacheStore, group: impl Into<String>, key_prefix: impl Into<String>) -> Self {
        Self {
            store,
            group: group.into(),
            key_prefix: key_prefix.into(),
            _entry: PhantomData,
        }
    }

    fn name(&self, key: &str) -> String {
        format!("{}-{key}", self.key_prefix)
    }

    /// Returns the entry for `key` unless it is missing or stale.
    ///
    /// A stale entry is deleted.
    pub async fn get_entry<F>(&self, key: &str, is_stale: F) -> Option<T>
    where
        F: FnOnce(&T) -> bool,
    {
        let name = self.name(key);
        let cached: T = self
            .store
            .read(Category::Cache, Some(&self.group), &name)
            .await?;

        if is_stale(&cached) {
            self.store
                .delete(Category::Cache, Some(&self.group), &name)
                .await;
            return None;
        }
        Some(cached)
    }

    /// Stores `entry` under `key`. Returns `false` if the write failed.
    pub async fn put_entry(&self, key: &str, entry: &T) -> bool {
        self.store
            .write(Category::Cache, Some(&self.group), &self.name(key), entry)
            .await
    }

    /// Deletes every stale entry in the group. Returns how many were removed.
    pub async fn delete_stale_entries<F>(&self, is_stale: F) -> usize
    where
        F: Fn(&T) -> bool + Send + 'static,
    {
        let prefix = format!("{}-", self.key_prefix);
        self.store
            .delete_stale(Category::Cache, Some(&self.group), Some(&prefix), is_stale)
            .await
    }
}
