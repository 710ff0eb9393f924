//! The store registry.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use arc_swap::ArcSwap;
use chrono::Utc;
use depot_core::{ArtifactStore, StoreKey};
use tracing::{debug, info, warn};

use crate::affected::AffectedByIndex;
use crate::config::RegistryConfig;
use crate::error::{RegistryError, Result};
use crate::event::{Delivery, EventDispatcher, StoreChange, StoreEvent, StoreEventListener, UpdateType};
use crate::lock::KeyLocks;
use crate::persist::{MemoryPersistence, StorePersistence};
use crate::query::StoreQuery;
use crate::resolve;

/// Immutable snapshot of every store definition.
pub type StoreMap = HashMap<StoreKey, Arc<ArtifactStore>>;

/// What `create` does when the key is already taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IfExists {
    /// Fail with `AlreadyExists`.
    #[default]
    Fail,
    /// Leave the existing store and return it.
    Skip,
    /// Replace the existing store.
    Overwrite,
}

/// Read access to stores, as seen by content resolution.
///
/// Implemented by the registry itself and by decorators that add behaviour on
/// a miss (such as provisioning stores on demand).
pub trait StoreLookup: Send + Sync {
    /// Find a store by key.
    fn lookup(&self, key: &StoreKey) -> Result<Option<Arc<ArtifactStore>>>;

    /// The registry backing this lookup.
    fn registry(&self) -> &StoreRegistry;

    /// Concrete stores reachable from `key`, in search order.
    fn ordered_concrete_stores(&self, key: &StoreKey, enabled_only: bool) -> Result<Vec<Arc<ArtifactStore>>> {
        if self.lookup(key)?.is_none() {
            return Ok(Vec::new());
        }
        Ok(self.registry().ordered_concrete_stores(key, enabled_only))
    }
}

/// Authoritative set of store definitions.
pub struct StoreRegistry {
    stores: ArcSwap<StoreMap>,
    affected: AffectedByIndex,
    locks: KeyLocks,
    persistence: Box<dyn StorePersistence>,
    events: EventDispatcher,
    config: RegistryConfig,
}

impl StoreRegistry {
    pub fn new(persistence: Box<dyn StorePersistence>, events: EventDispatcher, config: RegistryConfig) -> Self {
        StoreRegistry {
            stores: ArcSwap::from_pointee(StoreMap::new()),
            affected: AffectedByIndex::new(),
            locks: KeyLocks::new(config.lock_timeout()),
            persistence,
            events,
            config,
        }
    }

    /// Memory-only registry with synchronous events and default settings.
    pub fn in_memory() -> Self {
        Self::new(
            Box::new(MemoryPersistence::new()),
            EventDispatcher::synchronous(),
            RegistryConfig::default(),
        )
    }

    /// Replace in-memory state with everything the backend holds.
    ///
    /// No events are emitted. Returns the number of stores loaded.
    pub fn load(&self) -> Result<usize> {
        let stores = self.persistence.load_all()?;
        let map: StoreMap = stores
            .into_iter()
            .map(|s| (s.key().clone(), Arc::new(s)))
            .collect();
        self.affected.rebuild(map.values().map(|s| s.as_ref()));
        let count = map.len();
        self.stores.store(Arc::new(map));
        info!(count, "loaded store definitions");
        Ok(count)
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Lock-free point-in-time view of every store.
    pub fn snapshot(&self) -> Arc<StoreMap> {
        self.stores.load_full()
    }

    pub fn get(&self, key: &StoreKey) -> Option<Arc<ArtifactStore>> {
        self.stores.load().get(key).cloned()
    }

    pub fn contains(&self, key: &StoreKey) -> bool {
        self.stores.load().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.stores.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.stores.load().is_empty()
    }

    /// Start a filtered query over the current snapshot.
    pub fn query(&self) -> StoreQuery<'_> {
        StoreQuery::new(self.snapshot(), &self.affected)
    }

    /// Every group that transitively contains any of `keys`.
    pub fn affected_by<'a>(&self, keys: impl IntoIterator<Item = &'a StoreKey>) -> BTreeSet<StoreKey> {
        self.affected.affected_by(keys)
    }

    pub fn ordered_concrete_stores(&self, key: &StoreKey, enabled_only: bool) -> Vec<Arc<ArtifactStore>> {
        resolve::ordered_concrete_stores(&self.stores.load(), key, enabled_only)
    }

    pub fn ordered_stores_in_group(&self, key: &StoreKey, enabled_only: bool) -> Vec<Arc<ArtifactStore>> {
        resolve::ordered_stores_in_group(&self.stores.load(), key, enabled_only)
    }

    pub fn events(&self) -> &EventDispatcher {
        &self.events
    }

    pub fn subscribe(&self, listener: Arc<dyn StoreEventListener>, delivery: Delivery) {
        self.events.subscribe(listener, delivery);
    }

    /// Add a new store.
    pub fn create(&self, store: ArtifactStore, if_exists: IfExists) -> Result<Arc<ArtifactStore>> {
        validate(&store)?;
        let key = store.key().clone();
        let _guard = self.locks.lock(&key)?;

        let previous = self.get(&key);
        if let Some(existing) = &previous {
            match if_exists {
                IfExists::Fail => {
                    return Err(RegistryError::AlreadyExists { key: key.to_string() });
                }
                IfExists::Skip => {
                    debug!(key = %key, "store exists, skipping create");
                    return Ok(Arc::clone(existing));
                }
                IfExists::Overwrite => {}
            }
        }
        self.write_locked(store, previous)
    }

    /// Replace an existing store's definition.
    pub fn update(&self, store: ArtifactStore) -> Result<Arc<ArtifactStore>> {
        validate(&store)?;
        let key = store.key().clone();
        let _guard = self.locks.lock(&key)?;

        let previous = self
            .get(&key)
            .ok_or_else(|| RegistryError::NotFound { key: key.to_string() })?;
        self.write_locked(store, Some(previous))
    }

    /// Remove a store and every group's reference to it.
    ///
    /// Readonly hosted stores cannot be deleted.
    pub fn delete(&self, key: &StoreKey) -> Result<Arc<ArtifactStore>> {
        let (removed, affected_groups) = {
            let _guard = self.locks.lock(key)?;
            let existing = self
                .get(key)
                .ok_or_else(|| RegistryError::NotFound { key: key.to_string() })?;
            if existing.is_readonly() {
                return Err(RegistryError::Forbidden {
                    key: key.to_string(),
                    reason: "readonly hosted repositories cannot be deleted".to_string(),
                });
            }

            self.persistence.delete(key)?;
            let affected_groups = self.affected.affected_by([key]);
            self.stores.rcu(|map| {
                let mut next = StoreMap::clone(map);
                next.remove(key);
                next
            });
            if let Some(members) = existing.constituents() {
                self.affected.update_group(key, members, &[]);
            }
            info!(key = %key, "deleted store");
            (existing, affected_groups)
        };

        for group in self.affected.direct_groups(key) {
            self.prune_member(&group, key)?;
        }
        self.affected.forget(key);

        self.events.dispatch(StoreEvent::deleted(vec![Arc::clone(&removed)], affected_groups));
        Ok(removed)
    }

    fn prune_member(&self, group_key: &StoreKey, member: &StoreKey) -> Result<()> {
        let _guard = self.locks.lock(group_key)?;
        let Some(current) = self.get(group_key) else {
            return Ok(());
        };
        let mut pruned = ArtifactStore::clone(&current);
        let changed = match &mut pruned {
            ArtifactStore::Group(group) => group.remove_constituent(member),
            _ => false,
        };
        if changed {
            debug!(group = %group_key, member = %member, "removing deleted member from group");
            self.write_locked(pruned, Some(current))?;
        }
        Ok(())
    }

    /// Persist, publish and announce. The caller holds the key's lock.
    fn write_locked(&self, mut store: ArtifactStore, previous: Option<Arc<ArtifactStore>>) -> Result<Arc<ArtifactStore>> {
        let key = store.key().clone();

        if self.config.reject_cycles {
            if let Some(members) = store.constituents() {
                if resolve::reaches(&self.stores.load(), members, &key) {
                    return Err(RegistryError::validation(&key, "group membership would form a cycle"));
                }
            }
        }

        // Strictly increasing per key; index markers compare for equality.
        let now = Utc::now();
        let stamp = match previous.as_ref().and_then(|p| p.last_modified()) {
            Some(prev) if prev >= now => prev + chrono::Duration::nanoseconds(1),
            _ => now,
        };
        store.settings_mut().last_modified = Some(stamp);
        self.persistence.save(&store)?;

        let updated = Arc::new(store);
        self.stores.rcu(|map| {
            let mut next = StoreMap::clone(map);
            next.insert(key.clone(), Arc::clone(&updated));
            next
        });

        let old_members = previous.as_ref().and_then(|p| p.constituents()).unwrap_or(&[]);
        let new_members = updated.constituents().unwrap_or(&[]);
        self.affected.update_group(&key, old_members, new_members);

        let update_type = if previous.is_some() {
            UpdateType::Update
        } else {
            UpdateType::Add
        };
        info!(key = %key, ?update_type, "stored");

        let affected_groups = self.affected.affected_by([&key]);
        let change = StoreChange {
            previous,
            updated: Arc::clone(&updated),
        };
        self.events
            .dispatch(StoreEvent::updated(update_type, vec![change], affected_groups));
        Ok(updated)
    }
}

impl StoreLookup for StoreRegistry {
    fn lookup(&self, key: &StoreKey) -> Result<Option<Arc<ArtifactStore>>> {
        Ok(self.get(key))
    }

    fn registry(&self) -> &StoreRegistry {
        self
    }
}

fn validate(store: &ArtifactStore) -> Result<()> {
    store.validate().map_err(|e| {
        warn!(key = %store.key(), error = %e, "rejecting store definition");
        RegistryError::validation(store.key(), e.to_string())
    })
}
