//! Reverse membership index: which groups list a given key.
//!
//! Only direct edges are stored (`member -> groups listing it`). The
//! transitive "affected by" set is computed on demand with a worklist, which
//! keeps updates cheap and makes cyclic membership harmless.

use std::collections::{BTreeSet, HashMap, VecDeque};

use depot_core::{ArtifactStore, StoreKey};
use parking_lot::RwLock;

/// Member → groups that directly contain it.
#[derive(Debug, Default)]
pub struct AffectedByIndex {
    edges: RwLock<HashMap<StoreKey, BTreeSet<StoreKey>>>,
}

impl AffectedByIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the index with one derived from `stores`.
    pub fn rebuild<'a>(&self, stores: impl IntoIterator<Item = &'a ArtifactStore>) {
        let mut edges: HashMap<StoreKey, BTreeSet<StoreKey>> = HashMap::new();
        for store in stores {
            if let Some(members) = store.constituents() {
                for member in members {
                    edges.entry(member.clone()).or_default().insert(store.key().clone());
                }
            }
        }
        *self.edges.write() = edges;
    }

    /// Patch the edges of `group` from its old member list to its new one.
    ///
    /// Members present in both lists are left alone.
    pub fn update_group(&self, group: &StoreKey, old: &[StoreKey], new: &[StoreKey]) {
        let mut edges = self.edges.write();
        for removed in old.iter().filter(|k| !new.contains(k)) {
            if let Some(groups) = edges.get_mut(removed) {
                groups.remove(group);
                if groups.is_empty() {
                    edges.remove(removed);
                }
            }
        }
        for added in new.iter().filter(|k| !old.contains(k)) {
            edges.entry(added.clone()).or_default().insert(group.clone());
        }
    }

    /// Drop the entry for a deleted key.
    pub fn forget(&self, key: &StoreKey) {
        self.edges.write().remove(key);
    }

    /// Groups that list `key` directly.
    pub fn direct_groups(&self, key: &StoreKey) -> BTreeSet<StoreKey> {
        self.edges.read().get(key).cloned().unwrap_or_default()
    }

    /// Every group that transitively contains any of `keys`.
    pub fn affected_by<'a>(&self, keys: impl IntoIterator<Item = &'a StoreKey>) -> BTreeSet<StoreKey> {
        let edges = self.edges.read();
        let mut result = BTreeSet::new();
        let mut work: VecDeque<&StoreKey> = keys.into_iter().collect();

        while let Some(key) = work.pop_front() {
            if let Some(groups) = edges.get(key) {
                for group in groups {
                    if result.insert(group.clone()) {
                        work.push_back(group);
                    }
                }
            }
        }
        result
    }

    pub fn len(&self) -> usize {
        self.edges.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use depot_core::{Group, HostedRepository, MAVEN};

    fn group(name: &str, members: &[&StoreKey]) -> ArtifactStore {
        Group::new(MAVEN, name, members.iter().map(|k| (*k).clone()).collect()).into()
    }

    #[test]
    fn transitive_closure() {
        let h1 = StoreKey::hosted(MAVEN, "h1");
        let g1 = StoreKey::group(MAVEN, "g1");
        let g2 = StoreKey::group(MAVEN, "g2");
        let g3 = StoreKey::group(MAVEN, "g3");

        let index = AffectedByIndex::new();
        let stores = vec![
            ArtifactStore::from(HostedRepository::new(MAVEN, "h1")),
            group("g1", &[&h1]),
            group("g2", &[&g1]),
            group("g3", &[]),
        ];
        index.rebuild(&stores);

        let affected = index.affected_by([&h1]);
        assert_eq!(affected, BTreeSet::from([g1.clone(), g2.clone()]));
        assert!(!affected.contains(&g3));
        assert_eq!(index.direct_groups(&h1), BTreeSet::from([g1]));
    }

    #[test]
    fn cycles_terminate() {
        let g1 = StoreKey::group(MAVEN, "g1");
        let g2 = StoreKey::group(MAVEN, "g2");
        let index = AffectedByIndex::new();
        index.rebuild(&[group("g1", &[&g2]), group("g2", &[&g1])]);

        let affected = index.affected_by([&g1]);
        assert_eq!(affected, BTreeSet::from([g1, g2]));
    }

    #[test]
    fn update_diffs_members() {
        let a = StoreKey::hosted(MAVEN, "a");
        let b = StoreKey::hosted(MAVEN, "b");
        let c = StoreKey::hosted(MAVEN, "c");
        let g = StoreKey::group(MAVEN, "g");

        let index = AffectedByIndex::new();
        index.update_group(&g, &[], &[a.clone(), b.clone()]);
        index.update_group(&g, &[a.clone(), b.clone()], &[b.clone(), c.clone()]);

        assert!(index.affected_by([&a]).is_empty());
        assert!(index.affected_by([&b]).contains(&g));
        assert!(index.affected_by([&c]).contains(&g));
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn dangling_members_are_indexed() {
        let missing = StoreKey::remote(MAVEN, "not-yet");
        let g = StoreKey::group(MAVEN, "g");
        let index = AffectedByIndex::new();
        index.rebuild(&[group("g", &[&missing])]);
        assert_eq!(index.affected_by([&missing]), BTreeSet::from([g]));
    }
}
