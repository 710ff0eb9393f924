//! Concurrent `(store, path) → origin` cache.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use depot_core::StoreKey;
use tracing::trace;

use crate::config::IndexConfig;

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
    pub entries: usize,
}

/// A path as requested through a particular store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IndexedStorePath {
    pub store: StoreKey,
    pub path: String,
}

impl IndexedStorePath {
    pub fn new(store: &StoreKey, path: &str) -> Self {
        IndexedStorePath {
            store: store.clone(),
            path: normalize_path(path),
        }
    }
}

/// Where a path was found, and what the requesting store looked like then.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    /// The concrete store holding the content.
    pub origin: StoreKey,
    /// The requesting store's `last_modified` when the entry was recorded.
    pub marker: Option<DateTime<Utc>>,
    pub recorded_at: DateTime<Utc>,
}

/// The content index.
#[derive(Debug)]
pub struct ContentIndex {
    entries: DashMap<IndexedStorePath, IndexEntry>,
    enabled: bool,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl ContentIndex {
    pub fn new(config: &IndexConfig) -> Self {
        ContentIndex {
            entries: DashMap::new(),
            enabled: config.enabled,
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
        }
    }

    /// Whether lookups consult the index at all.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Look up the origin recorded for `path` requested through `store`.
    pub fn lookup(&self, store: &StoreKey, path: &str) -> Option<IndexEntry> {
        if !self.enabled {
            return None;
        }
        let found = self
            .entries
            .get(&IndexedStorePath::new(store, path))
            .map(|e| e.value().clone());
        match found {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        found
    }

    /// Record that `path`, requested through `store`, was served by `origin`.
    pub fn record(&self, store: &StoreKey, path: &str, origin: &StoreKey, marker: Option<DateTime<Utc>>) {
        if !self.enabled {
            return;
        }
        trace!(store = %store, path, origin = %origin, "indexing path");
        self.entries.insert(
            IndexedStorePath::new(store, path),
            IndexEntry {
                origin: origin.clone(),
                marker,
                recorded_at: Utc::now(),
            },
        );
    }

    /// Drop one entry.
    pub fn remove(&self, store: &StoreKey, path: &str) -> bool {
        self.entries.remove(&IndexedStorePath::new(store, path)).is_some()
    }

    /// Drop every entry for `path` that was served by `origin`.
    pub fn remove_content(&self, origin: &StoreKey, path: &str) -> usize {
        let path = normalize_path(path);
        self.remove_where(|k, e| k.path == path && &e.origin == origin)
    }

    /// Drop entries whose requesting store or origin is in `keys`.
    pub fn invalidate(&self, keys: &BTreeSet<StoreKey>) -> usize {
        if keys.is_empty() {
            return 0;
        }
        self.remove_where(|k, e| keys.contains(&k.store) || keys.contains(&e.origin))
    }

    /// Drop entries requested through any store in `keys`.
    pub fn invalidate_requesting(&self, keys: &BTreeSet<StoreKey>) -> usize {
        if keys.is_empty() {
            return 0;
        }
        self.remove_where(|k, _| keys.contains(&k.store))
    }

    /// Drop entries for `path` requested through any store in `keys`.
    pub fn invalidate_path(&self, keys: &BTreeSet<StoreKey>, path: &str) -> usize {
        keys.iter().filter(|k| self.remove(k, path)).count()
    }

    fn remove_where(&self, doomed: impl Fn(&IndexedStorePath, &IndexEntry) -> bool) -> usize {
        let removed = AtomicUsize::new(0);
        self.entries.retain(|k, e| {
            if doomed(k, e) {
                removed.fetch_add(1, Ordering::Relaxed);
                false
            } else {
                true
            }
        });
        removed.into_inner()
    }

    /// Move entries requested through `store` from marker `from` to `to`.
    pub fn restamp(&self, store: &StoreKey, from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> usize {
        let mut moved = 0;
        for mut entry in self.entries.iter_mut() {
            if &entry.key().store == store && entry.value().marker == from {
                entry.value_mut().marker = to;
                moved += 1;
            }
        }
        moved
    }

    /// Paths currently indexed for `store`.
    pub fn paths_for(&self, store: &StoreKey) -> Vec<String> {
        let mut paths: Vec<String> = self
            .entries
            .iter()
            .filter(|e| &e.key().store == store)
            .map(|e| e.key().path.clone())
            .collect();
        paths.sort();
        paths
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Return cache usage statistics.
    pub fn statistics(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.entries.len(),
        }
    }
}

impl Default for ContentIndex {
    fn default() -> Self {
        Self::new(&IndexConfig::default())
    }
}

/// Canonical form of a content path: one leading `/`, no empty segments.
pub fn normalize_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len() + 1);
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        out.push('/');
        out.push_str(segment);
    }
    if out.is_empty() {
        out.push('/');
    } else if path.ends_with('/') {
        out.push('/');
    }
    out
}
