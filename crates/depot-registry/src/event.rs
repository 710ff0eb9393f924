//! Store change events and their delivery.
//!
//! The registry emits one event per successful mutation, after the new state
//! is visible to readers. Each event also carries the transitive set of groups
//! whose membership includes the changed keys, computed at emission time, so
//! listeners never need to call back into the registry.

use std::collections::BTreeSet;
use std::sync::Arc;

use depot_core::{ArtifactStore, StoreKey};
use parking_lot::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::config::RegistryConfig;
use crate::pool::WorkerPool;

/// Whether a write introduced a key or replaced an existing definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateType {
    Add,
    Update,
}

/// One store's before/after pair.
#[derive(Debug, Clone)]
pub struct StoreChange {
    pub previous: Option<Arc<ArtifactStore>>,
    pub updated: Arc<ArtifactStore>,
}

impl StoreChange {
    /// Whether the effective enablement changed.
    pub fn enablement_changed(&self) -> bool {
        self.previous
            .as_ref()
            .map_or(false, |prev| prev.is_disabled() != self.updated.is_disabled())
    }

    /// Whether the effective authoritative-index flag went from on to off.
    pub fn authoritative_dropped(&self) -> bool {
        self.previous
            .as_ref()
            .map_or(false, |prev| prev.authoritative_index() && !self.updated.authoritative_index())
    }
}

/// Emitted after a create or update.
#[derive(Debug, Clone)]
pub struct StorePostUpdateEvent {
    pub id: Uuid,
    pub update_type: UpdateType,
    pub changes: Vec<StoreChange>,
    /// Every group that transitively contains a changed key.
    pub affected_groups: BTreeSet<StoreKey>,
}

/// Emitted after a delete.
#[derive(Debug, Clone)]
pub struct StoreDeletePostEvent {
    pub id: Uuid,
    pub deleted: Vec<Arc<ArtifactStore>>,
    /// Every group that transitively contained a deleted key.
    pub affected_groups: BTreeSet<StoreKey>,
}

impl StoreDeletePostEvent {
    pub fn deleted_keys(&self) -> impl Iterator<Item = &StoreKey> {
        self.deleted.iter().map(|s| s.key())
    }
}

#[derive(Debug, Clone)]
pub enum StoreEvent {
    Updated(StorePostUpdateEvent),
    Deleted(StoreDeletePostEvent),
}

impl StoreEvent {
    pub fn updated(
        update_type: UpdateType,
        changes: Vec<StoreChange>,
        affected_groups: BTreeSet<StoreKey>,
    ) -> Self {
        StoreEvent::Updated(StorePostUpdateEvent {
            id: Uuid::new_v4(),
            update_type,
            changes,
            affected_groups,
        })
    }

    pub fn deleted(deleted: Vec<Arc<ArtifactStore>>, affected_groups: BTreeSet<StoreKey>) -> Self {
        StoreEvent::Deleted(StoreDeletePostEvent {
            id: Uuid::new_v4(),
            deleted,
            affected_groups,
        })
    }

    pub fn id(&self) -> Uuid {
        match self {
            StoreEvent::Updated(e) => e.id,
            StoreEvent::Deleted(e) => e.id,
        }
    }
}

/// Receives store change events.
pub trait StoreEventListener: Send + Sync {
    fn on_event(&self, event: &StoreEvent);
}

impl<F> StoreEventListener for F
where
    F: Fn(&StoreEvent) + Send + Sync,
{
    fn on_event(&self, event: &StoreEvent) {
        self(event)
    }
}

/// How a listener receives events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Before the mutating call returns, on the mutating thread.
    Inline,
    /// Later, on the dispatcher's worker pool.
    Pooled,
}

/// Fans events out to subscribed listeners.
pub struct EventDispatcher {
    inline: RwLock<Vec<Arc<dyn StoreEventListener>>>,
    pooled: RwLock<Vec<Arc<dyn StoreEventListener>>>,
    pool: Option<WorkerPool>,
}

impl EventDispatcher {
    /// Dispatcher with a worker pool sized from the registry config.
    pub fn new(config: &RegistryConfig) -> std::io::Result<Self> {
        let pool = WorkerPool::new("store-events", config.event_workers, config.event_queue)?;
        Ok(EventDispatcher {
            inline: RwLock::new(Vec::new()),
            pooled: RwLock::new(Vec::new()),
            pool: Some(pool),
        })
    }

    /// Dispatcher without a pool; pooled listeners run inline too.
    pub fn synchronous() -> Self {
        EventDispatcher {
            inline: RwLock::new(Vec::new()),
            pooled: RwLock::new(Vec::new()),
            pool: None,
        }
    }

    pub fn subscribe(&self, listener: Arc<dyn StoreEventListener>, delivery: Delivery) {
        match delivery {
            Delivery::Inline => self.inline.write().push(listener),
            Delivery::Pooled => self.pooled.write().push(listener),
        }
    }

    pub fn dispatch(&self, event: StoreEvent) {
        let event = Arc::new(event);
        debug!(event = %event.id(), "dispatching store event");

        for listener in self.inline.read().iter() {
            listener.on_event(&event);
        }

        for listener in self.pooled.read().iter() {
            match &self.pool {
                Some(pool) => {
                    let listener = Arc::clone(listener);
                    let event = Arc::clone(&event);
                    pool.execute(move || listener.on_event(&event));
                }
                None => listener.on_event(&event),
            }
        }
    }

    /// Wait for pooled deliveries to drain.
    pub fn quiesce(&self) {
        if let Some(pool) = &self.pool {
            pool.quiesce();
        }
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::synchronous()
    }
}
