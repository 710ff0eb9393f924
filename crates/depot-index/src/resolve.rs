//! Group-aware content resolution backed by the content index.
//!
//! A lookup through a group walks its members depth-first in constituent
//! order, with the same visited-set rules as group flattening, and stops at
//! the first concrete store holding the path. Every store on the way down
//! (the requested group, each intermediate group, the concrete origin) gets
//! an index entry so the next lookup through any of them is a single probe.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use depot_core::{ArtifactStore, StoreKey};
use depot_registry::{StoreLookup, StoreMap};
use tracing::{debug, trace, warn};

use crate::cache::ContentIndex;
use crate::error::Result;
use crate::source::ContentSource;

/// What the index says about a store/path pair.
enum Indexed {
    /// An origin the index vouches for.
    Hit(StoreKey),
    /// No entry, and the index is in a position to say so.
    Miss,
    /// The index cannot answer; fall back to a real check.
    Unknown,
}

/// Resolves paths through stores.
pub struct ContentResolver {
    stores: Arc<dyn StoreLookup>,
    index: Arc<ContentIndex>,
    source: Arc<dyn ContentSource>,
}

impl ContentResolver {
    pub fn new(stores: Arc<dyn StoreLookup>, index: Arc<ContentIndex>, source: Arc<dyn ContentSource>) -> Self {
        ContentResolver { stores, index, source }
    }

    pub fn index(&self) -> &ContentIndex {
        &self.index
    }

    /// The concrete store that serves `path` when requested through `key`.
    ///
    /// Unknown or disabled stores resolve to `None`.
    pub fn locate(&self, key: &StoreKey, path: &str) -> Result<Option<StoreKey>> {
        let Some(store) = self.stores.lookup(key)? else {
            return Ok(None);
        };
        if store.is_disabled() {
            return Ok(None);
        }

        let snapshot = self.stores.registry().snapshot();
        let mut visited = HashSet::from([key.clone()]);
        let mut chain = Vec::new();
        let found = self.search(&snapshot, &store, path, &mut visited, &mut chain);
        match &found {
            Some(origin) => debug!(key = %key, path, origin = %origin, "located content"),
            None => trace!(key = %key, path, "content not found"),
        }
        Ok(found)
    }

    /// Every enabled concrete store reachable from `key` that holds `path`, in order.
    pub fn locate_all(&self, key: &StoreKey, path: &str) -> Result<Vec<StoreKey>> {
        let snapshot = self.stores.registry().snapshot();
        let members = self.stores.ordered_concrete_stores(key, true)?;
        Ok(members
            .iter()
            .filter(|store| self.concrete_has(&snapshot, store, path))
            .map(|store| store.key().clone())
            .collect())
    }

    /// Content was written directly into `origin`.
    ///
    /// Groups containing `origin` may now resolve `path` differently, so
    /// their entries for it are dropped.
    pub fn content_stored(&self, origin: &StoreKey, path: &str) {
        let Some(store) = self.stores.registry().get(origin) else {
            return;
        };
        self.index.record(origin, path, origin, store.last_modified());
        let groups: BTreeSet<StoreKey> = self.stores.registry().affected_by([origin]);
        let dropped = self.index.invalidate_path(&groups, path);
        trace!(origin = %origin, path, dropped, "indexed stored content");
    }

    /// Content was removed from `origin`.
    pub fn content_removed(&self, origin: &StoreKey, path: &str) {
        let dropped = self.index.remove_content(origin, path);
        trace!(origin = %origin, path, dropped, "de-indexed removed content");
    }

    fn search(
        &self,
        snapshot: &StoreMap,
        store: &Arc<ArtifactStore>,
        path: &str,
        visited: &mut HashSet<StoreKey>,
        chain: &mut Vec<Arc<ArtifactStore>>,
    ) -> Option<StoreKey> {
        let group = match store.as_ref() {
            ArtifactStore::Group(group) => group,
            _ => {
                if self.concrete_has(snapshot, store, path) {
                    let origin = store.key().clone();
                    self.record_chain(chain, path, &origin);
                    return Some(origin);
                }
                return None;
            }
        };

        if let Indexed::Hit(origin) = self.indexed(snapshot, store, path) {
            self.record_chain(chain, path, &origin);
            return Some(origin);
        }

        chain.push(Arc::clone(store));
        let mut found = None;
        for member_key in &group.constituents {
            if !visited.insert(member_key.clone()) {
                continue;
            }
            let Some(member) = snapshot.get(member_key) else {
                continue;
            };
            if member.is_disabled() {
                continue;
            }
            found = self.search(snapshot, member, path, visited, chain);
            if found.is_some() {
                break;
            }
        }
        chain.pop();
        found
    }

    /// Whether a concrete store holds `path`, honouring its authoritative flag.
    fn concrete_has(&self, snapshot: &StoreMap, store: &Arc<ArtifactStore>, path: &str) -> bool {
        match self.indexed(snapshot, store, path) {
            Indexed::Hit(_) => true,
            Indexed::Miss => false,
            Indexed::Unknown => {
                let held = self.probe(store, path);
                if held {
                    self.index.record(store.key(), path, store.key(), store.last_modified());
                }
                held
            }
        }
    }

    fn indexed(&self, snapshot: &StoreMap, store: &ArtifactStore, path: &str) -> Indexed {
        if !self.index.is_enabled() {
            return Indexed::Unknown;
        }
        let key = store.key();
        let authoritative = key.is_concrete() && store.authoritative_index();
        // Group and authoritative entries hold only for the definition they were recorded against.
        let marked = authoritative || !key.is_concrete();

        let Some(entry) = self.index.lookup(key, path) else {
            return if authoritative {
                Indexed::Miss
            } else {
                Indexed::Unknown
            };
        };

        if marked && entry.marker != store.last_modified() {
            trace!(key = %key, path, "index entry predates current definition");
            self.index.remove(key, path);
            return Indexed::Unknown;
        }
        if authoritative {
            return Indexed::Hit(entry.origin);
        }

        let verified = snapshot
            .get(&entry.origin)
            .filter(|origin| origin.key().is_concrete() && origin.is_enabled())
            .map_or(false, |origin| self.probe(origin, path));
        if verified {
            Indexed::Hit(entry.origin)
        } else {
            debug!(key = %key, path, origin = %entry.origin, "indexed origin no longer serves path");
            self.index.remove(key, path);
            if &entry.origin != key {
                self.index.remove(&entry.origin, path);
            }
            Indexed::Unknown
        }
    }

    /// Index `path` for every group the search passed through.
    ///
    /// Nothing is written when one of those groups was redefined since the
    /// search began; one landing during the write removes it again.
    fn record_chain(&self, chain: &[Arc<ArtifactStore>], path: &str, origin: &StoreKey) {
        if chain.is_empty() {
            return;
        }
        if !self.chain_current(chain) {
            debug!(path, origin = %origin, "group changed during lookup, not indexing");
            return;
        }
        for group in chain {
            self.index.record(group.key(), path, origin, group.last_modified());
        }
        if !self.chain_current(chain) {
            for group in chain {
                self.index.remove(group.key(), path);
            }
        }
    }

    fn chain_current(&self, chain: &[Arc<ArtifactStore>]) -> bool {
        let registry = self.stores.registry();
        chain.iter().all(|group| {
            registry
                .get(group.key())
                .map_or(false, |live| live.last_modified() == group.last_modified())
        })
    }

    fn probe(&self, store: &ArtifactStore, path: &str) -> bool {
        match self.source.exists(store, path) {
            Ok(held) => held,
            Err(e) => {
                warn!(key = %store.key(), path, error = %e, "content check failed, treating as absent");
                false
            }
        }
    }
}
