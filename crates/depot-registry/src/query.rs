//! Fluent, filtered queries over a registry snapshot.

use std::collections::BTreeSet;
use std::sync::Arc;

use depot_core::{ArtifactStore, StoreKey, StoreType, MAVEN};

use crate::affected::AffectedByIndex;
use crate::registry::StoreMap;
use crate::resolve;

/// A query bound to one snapshot. Filters narrow the stores returned by every
/// terminal operation.
pub struct StoreQuery<'r> {
    snapshot: Arc<StoreMap>,
    affected: &'r AffectedByIndex,
    package_type: Option<String>,
    store_types: Option<Vec<StoreType>>,
    enabled: Option<bool>,
}

impl<'r> StoreQuery<'r> {
    pub(crate) fn new(snapshot: Arc<StoreMap>, affected: &'r AffectedByIndex) -> Self {
        StoreQuery {
            snapshot,
            affected,
            package_type: None,
            store_types: None,
            enabled: None,
        }
    }

    pub fn package_type(mut self, package_type: impl Into<String>) -> Self {
        self.package_type = Some(package_type.into());
        self
    }

    pub fn store_types(mut self, types: &[StoreType]) -> Self {
        self.store_types = Some(types.to_vec());
        self
    }

    /// Only remote and hosted stores.
    pub fn concrete_stores(self) -> Self {
        self.store_types(&[StoreType::Remote, StoreType::Hosted])
    }

    /// Only enabled (`true`) or only disabled (`false`) stores.
    pub fn enabled_state(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }

    fn accepts(&self, store: &ArtifactStore) -> bool {
        let key = store.key();
        if let Some(pt) = &self.package_type {
            if key.package_type() != pt {
                return false;
            }
        }
        if let Some(types) = &self.store_types {
            if !types.contains(&key.store_type()) {
                return false;
            }
        }
        if let Some(enabled) = self.enabled {
            if store.is_enabled() != enabled {
                return false;
            }
        }
        true
    }

    fn collect<'a>(&self, stores: impl Iterator<Item = &'a Arc<ArtifactStore>>) -> Vec<Arc<ArtifactStore>> {
        stores.filter(|s| self.accepts(s)).cloned().collect()
    }

    fn group_key(&self, name: &str) -> StoreKey {
        StoreKey::group(self.package_type.as_deref().unwrap_or(MAVEN), name)
    }

    /// Every matching store, sorted by key.
    pub fn all(&self) -> Vec<Arc<ArtifactStore>> {
        let mut stores = self.collect(self.snapshot.values());
        stores.sort_by(|a, b| a.key().cmp(b.key()));
        stores
    }

    pub fn count(&self) -> usize {
        self.snapshot.values().filter(|s| self.accepts(s)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// First matching store with this name, in key order.
    pub fn by_name(&self, name: &str) -> Option<Arc<ArtifactStore>> {
        self.all().into_iter().find(|s| s.key().name() == name)
    }

    /// Groups that list `key` directly.
    pub fn groups_containing(&self, key: &StoreKey) -> Vec<Arc<ArtifactStore>> {
        let groups = self.affected.direct_groups(key);
        self.collect(groups.iter().filter_map(|g| self.snapshot.get(g)))
    }

    /// Groups that transitively contain any of `keys`.
    pub fn groups_affected_by<'k>(&self, keys: impl IntoIterator<Item = &'k StoreKey>) -> Vec<Arc<ArtifactStore>> {
        let groups: BTreeSet<StoreKey> = self.affected.affected_by(keys);
        self.collect(groups.iter().filter_map(|g| self.snapshot.get(g)))
    }

    /// Concrete members of the named group (package type defaults to maven).
    ///
    /// `enabled_state(true)` skips disabled members.
    pub fn ordered_concrete_stores_in_group(&self, name: &str) -> Vec<Arc<ArtifactStore>> {
        let enabled_only = self.enabled == Some(true);
        resolve::ordered_concrete_stores(&self.snapshot, &self.group_key(name), enabled_only)
    }

    /// Members of the named group including nested groups.
    pub fn ordered_stores_in_group(&self, name: &str) -> Vec<Arc<ArtifactStore>> {
        let enabled_only = self.enabled == Some(true);
        resolve::ordered_stores_in_group(&self.snapshot, &self.group_key(name), enabled_only)
    }

    /// Remote repository proxying `url`, ignoring scheme, case and trailing slashes.
    pub fn remote_by_url(&self, url: &str) -> Option<Arc<ArtifactStore>> {
        let wanted = normalize_url(url);
        self.all().into_iter().find(|s| {
            s.as_remote()
                .map_or(false, |remote| normalize_url(&remote.url) == wanted)
        })
    }
}

fn normalize_url(url: &str) -> String {
    let without_scheme = url.split_once("://").map_or(url, |(_, rest)| rest);
    without_scheme.trim_end_matches('/').to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use crate::registry::{IfExists, StoreRegistry};
    use depot_core::{ArtifactStore, Group, HostedRepository, RemoteRepository, StoreKey, StoreType, MAVEN, NPM};

    fn populated() -> StoreRegistry {
        let registry = StoreRegistry::in_memory();
        let stores: Vec<ArtifactStore> = vec![
            HostedRepository::new(MAVEN, "local").into(),
            RemoteRepository::new(MAVEN, "central", "https://repo.maven.apache.org/maven2/").into(),
            RemoteRepository::new(NPM, "npmjs", "https://registry.npmjs.org").into(),
            Group::new(
                MAVEN,
                "public",
                vec![StoreKey::hosted(MAVEN, "local"), StoreKey::remote(MAVEN, "central")],
            )
            .into(),
            Group::new(MAVEN, "outer", vec![StoreKey::group(MAVEN, "public")]).into(),
        ];
        for store in stores {
            registry.create(store, IfExists::Fail).unwrap();
        }
        registry
    }

    #[test]
    fn filters_compose() {
        let registry = populated();
        assert_eq!(registry.query().count(), 5);
        assert_eq!(registry.query().package_type(NPM).count(), 1);
        assert_eq!(registry.query().package_type(MAVEN).concrete_stores().count(), 2);
        assert_eq!(registry.query().store_types(&[StoreType::Group]).count(), 2);

        let mut central = ArtifactStore::clone(&registry.get(&StoreKey::remote(MAVEN, "central")).unwrap());
        central.disable(None);
        registry.update(central).unwrap();
        assert_eq!(registry.query().enabled_state(false).count(), 1);
        assert_eq!(
            registry
                .query()
                .enabled_state(true)
                .ordered_concrete_stores_in_group("public")
                .len(),
            1
        );
        assert_eq!(registry.query().ordered_concrete_stores_in_group("public").len(), 2);
    }

    #[test]
    fn group_membership_queries() {
        let registry = populated();
        let local = StoreKey::hosted(MAVEN, "local");

        let direct = registry.query().groups_containing(&local);
        assert_eq!(direct.len(), 1);
        assert_eq!(direct[0].key().name(), "public");

        let affected = registry.query().groups_affected_by([&local]);
        let names: Vec<&str> = affected.iter().map(|s| s.key().name()).collect();
        assert_eq!(names, vec!["outer", "public"]);

        let with_groups = registry.query().ordered_stores_in_group("outer");
        let names: Vec<&str> = with_groups.iter().map(|s| s.key().name()).collect();
        assert_eq!(names, vec!["public", "local", "central"]);
    }

    #[test]
    fn lookup_by_name_and_url() {
        let registry = populated();
        let npm = registry.query().package_type(NPM).by_name("npmjs").unwrap();
        assert_eq!(npm.key().store_type(), StoreType::Remote);

        let found = registry
            .query()
            .remote_by_url("http://REPO.maven.apache.org/maven2")
            .unwrap();
        assert_eq!(found.key().name(), "central");
        assert!(registry.query().remote_by_url("https://elsewhere.example.com/").is_none());
    }
}
