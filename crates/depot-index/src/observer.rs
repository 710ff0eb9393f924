//! Keeps the content index consistent with store changes.
//!
//! Two listeners split the work:
//! - [`AuthoritativeIndexGuard`] runs inline so that switching a store's
//!   authoritative flag off takes effect before the update call returns.
//! - [`IndexInvalidator`] runs on the registry's worker pool and handles
//!   everything else.

use std::collections::BTreeSet;
use std::sync::Arc;

use depot_core::{ArtifactStore, StoreKey};
use depot_registry::{Delivery, StoreChange, StoreEvent, StoreEventListener, StoreRegistry};
use tracing::{debug, trace};

use crate::cache::ContentIndex;

/// Subscribe both index listeners to `registry`.
pub fn attach(registry: &StoreRegistry, index: Arc<ContentIndex>) {
    registry.subscribe(
        Arc::new(AuthoritativeIndexGuard {
            index: Arc::clone(&index),
        }),
        Delivery::Inline,
    );
    registry.subscribe(Arc::new(IndexInvalidator { index }), Delivery::Pooled);
}

/// Clears a store's entries the moment its authoritative flag is dropped.
pub struct AuthoritativeIndexGuard {
    index: Arc<ContentIndex>,
}

impl AuthoritativeIndexGuard {
    pub fn new(index: Arc<ContentIndex>) -> Self {
        AuthoritativeIndexGuard { index }
    }
}

impl StoreEventListener for AuthoritativeIndexGuard {
    fn on_event(&self, event: &StoreEvent) {
        let StoreEvent::Updated(update) = event else {
            return;
        };
        for change in update.changes.iter().filter(|c| c.authoritative_dropped()) {
            let key = change.updated.key();
            let dropped = self.index.invalidate(&BTreeSet::from([key.clone()]));
            debug!(key = %key, dropped, "authoritative index disabled, entries cleared");
        }
    }
}

/// Drops index entries made stale by store changes.
pub struct IndexInvalidator {
    index: Arc<ContentIndex>,
}

impl IndexInvalidator {
    pub fn new(index: Arc<ContentIndex>) -> Self {
        IndexInvalidator { index }
    }

    fn on_change(&self, change: &StoreChange, affected: &BTreeSet<StoreKey>) -> usize {
        let key = change.updated.key();
        let Some(previous) = &change.previous else {
            // A new store may shadow later members of groups that already listed it.
            return self.index.invalidate_requesting(affected);
        };

        match (previous.as_ref(), change.updated.as_ref()) {
            (ArtifactStore::Group(old), ArtifactStore::Group(new)) => {
                let appended = new.constituents.starts_with(&old.constituents);
                if appended && !change.enablement_changed() {
                    // Earlier members still win; existing entries carry over.
                    let moved = self
                        .index
                        .restamp(key, previous.last_modified(), change.updated.last_modified());
                    trace!(group = %key, moved, "members appended, entries kept");
                    return 0;
                }
                let mut doomed = affected.clone();
                doomed.insert(key.clone());
                self.index.invalidate_requesting(&doomed)
            }
            (old, new) => {
                if !changes_resolution(old, new) {
                    return 0;
                }
                self.index.invalidate(&BTreeSet::from([key.clone()])) + self.index.invalidate_requesting(affected)
            }
        }
    }
}

impl StoreEventListener for IndexInvalidator {
    fn on_event(&self, event: &StoreEvent) {
        let dropped = match event {
            StoreEvent::Updated(update) => update
                .changes
                .iter()
                .map(|c| self.on_change(c, &update.affected_groups))
                .sum::<usize>(),
            StoreEvent::Deleted(deleted) => {
                let keys: BTreeSet<_> = deleted.deleted_keys().cloned().collect();
                self.index.invalidate(&keys) + self.index.invalidate_requesting(&deleted.affected_groups)
            }
        };
        debug!(event = %event.id(), dropped, "content index invalidated");
    }
}

/// Whether a concrete store's new definition can change what it serves.
fn changes_resolution(old: &ArtifactStore, new: &ArtifactStore) -> bool {
    if old.is_disabled() != new.is_disabled() || old.authoritative_index() != new.authoritative_index() {
        return true;
    }
    match (old.as_remote(), new.as_remote()) {
        (Some(a), Some(b)) => a.url != b.url || a.passthrough != b.passthrough,
        _ => false,
    }
}
