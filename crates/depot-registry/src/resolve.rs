//! Group flattening.
//!
//! A group is expanded depth-first, in constituent order, into the ordered
//! list of stores a lookup should try. A visited set guarantees termination
//! and de-duplication: the first occurrence of a key wins and later ones are
//! skipped, so cyclic or diamond-shaped membership never errors.

use std::collections::HashSet;
use std::sync::Arc;

use depot_core::{ArtifactStore, Group, StoreKey};
use tracing::debug;

use crate::registry::StoreMap;

#[derive(Debug, Clone, Copy)]
struct Flatten {
    include_groups: bool,
    enabled_only: bool,
}

/// The concrete (remote and hosted) stores reachable from `key`, in search order.
///
/// An unknown key yields an empty list. A concrete key yields itself.
pub fn ordered_concrete_stores(map: &StoreMap, key: &StoreKey, enabled_only: bool) -> Vec<Arc<ArtifactStore>> {
    flatten(
        map,
        key,
        Flatten {
            include_groups: false,
            enabled_only,
        },
    )
}

/// Like [`ordered_concrete_stores`] but nested groups are kept in the output,
/// each immediately before its own members. The starting group is not included.
pub fn ordered_stores_in_group(map: &StoreMap, key: &StoreKey, enabled_only: bool) -> Vec<Arc<ArtifactStore>> {
    flatten(
        map,
        key,
        Flatten {
            include_groups: true,
            enabled_only,
        },
    )
}

fn flatten(map: &StoreMap, key: &StoreKey, opts: Flatten) -> Vec<Arc<ArtifactStore>> {
    let Some(root) = map.get(key) else {
        return Vec::new();
    };
    if opts.enabled_only && root.is_disabled() {
        return Vec::new();
    }

    let group = match root.as_ref() {
        ArtifactStore::Group(group) => group,
        _ => return vec![Arc::clone(root)],
    };

    let mut visited = HashSet::from([key.clone()]);
    let mut path = vec![key.clone()];
    let mut out = Vec::new();
    walk(map, group, opts, &mut visited, &mut path, &mut out);
    out
}

fn walk(
    map: &StoreMap,
    group: &Group,
    opts: Flatten,
    visited: &mut HashSet<StoreKey>,
    path: &mut Vec<StoreKey>,
    out: &mut Vec<Arc<ArtifactStore>>,
) {
    for member in &group.constituents {
        if !visited.insert(member.clone()) {
            if path.contains(member) {
                debug!(group = %group.settings.key, member = %member, "membership cycle, skipping");
            }
            continue;
        }

        let Some(store) = map.get(member) else {
            debug!(group = %group.settings.key, member = %member, "skipping missing constituent");
            continue;
        };
        if opts.enabled_only && store.is_disabled() {
            continue;
        }

        match store.as_ref() {
            ArtifactStore::Group(inner) => {
                if opts.include_groups {
                    out.push(Arc::clone(store));
                }
                path.push(member.clone());
                walk(map, inner, opts, visited, path, out);
                path.pop();
            }
            _ => out.push(Arc::clone(store)),
        }
    }
}

/// Whether `target` is reachable by following membership from any of `start`.
pub(crate) fn reaches(map: &StoreMap, start: &[StoreKey], target: &StoreKey) -> bool {
    let mut visited = HashSet::new();
    let mut stack: Vec<&StoreKey> = start.iter().collect();

    while let Some(key) = stack.pop() {
        if key == target {
            return true;
        }
        if !visited.insert(key) {
            continue;
        }
        if let Some(members) = map.get(key).and_then(|s| s.constituents()) {
            stack.extend(members.iter());
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use depot_core::{HostedRepository, RemoteRepository, MAVEN};
    use proptest::prelude::*;

    fn map_of(stores: Vec<ArtifactStore>) -> StoreMap {
        stores
            .into_iter()
            .map(|s| (s.key().clone(), Arc::new(s)))
            .collect()
    }

    fn hosted(name: &str) -> ArtifactStore {
        HostedRepository::new(MAVEN, name).into()
    }

    fn remote(name: &str) -> ArtifactStore {
        RemoteRepository::new(MAVEN, name, format!("https://{name}.example.com/")).into()
    }

    fn group(name: &str, members: &[StoreKey]) -> ArtifactStore {
        Group::new(MAVEN, name, members.to_vec()).into()
    }

    fn names(stores: &[Arc<ArtifactStore>]) -> Vec<&str> {
        stores.iter().map(|s| s.key().name()).collect()
    }

    fn hk(name: &str) -> StoreKey {
        StoreKey::hosted(MAVEN, name)
    }

    fn rk(name: &str) -> StoreKey {
        StoreKey::remote(MAVEN, name)
    }

    fn gk(name: &str) -> StoreKey {
        StoreKey::group(MAVEN, name)
    }

    #[test]
    fn nested_groups_flatten_depth_first() {
        // G1=[H1, G2], G2=[R1, H2]
        let map = map_of(vec![
            hosted("h1"),
            hosted("h2"),
            remote("r1"),
            group("g1", &[hk("h1"), gk("g2")]),
            group("g2", &[rk("r1"), hk("h2")]),
        ]);
        let concrete = ordered_concrete_stores(&map, &gk("g1"), true);
        assert_eq!(names(&concrete), vec!["h1", "r1", "h2"]);

        let all = ordered_stores_in_group(&map, &gk("g1"), true);
        assert_eq!(names(&all), vec!["h1", "g2", "r1", "h2"]);
    }

    #[test]
    fn cycle_is_truncated() {
        // G1=[H1, G2], G2=[G1, R1]
        let map = map_of(vec![
            hosted("h1"),
            remote("r1"),
            group("g1", &[hk("h1"), gk("g2")]),
            group("g2", &[gk("g1"), rk("r1")]),
        ]);
        let concrete = ordered_concrete_stores(&map, &gk("g1"), false);
        assert_eq!(names(&concrete), vec!["h1", "r1"]);
    }

    #[test]
    fn duplicates_keep_first_occurrence() {
        let map = map_of(vec![
            hosted("h1"),
            remote("r1"),
            group("inner", &[rk("r1"), hk("h1")]),
            group("outer", &[hk("h1"), gk("inner")]),
        ]);
        let concrete = ordered_concrete_stores(&map, &gk("outer"), false);
        assert_eq!(names(&concrete), vec!["h1", "r1"]);
    }

    #[test]
    fn disabled_and_missing_members_are_skipped() {
        let mut r1 = remote("r1");
        r1.disable(None);
        let mut g2 = group("g2", &[hk("h2")]);
        g2.disable(None);
        let map = map_of(vec![
            hosted("h1"),
            hosted("h2"),
            r1,
            g2,
            group("g1", &[rk("r1"), rk("ghost"), hk("h1"), gk("g2")]),
        ]);

        assert_eq!(names(&ordered_concrete_stores(&map, &gk("g1"), true)), vec!["h1"]);
        assert_eq!(
            names(&ordered_concrete_stores(&map, &gk("g1"), false)),
            vec!["r1", "h1", "h2"]
        );
    }

    #[test]
    fn unknown_and_concrete_roots() {
        let map = map_of(vec![hosted("h1")]);
        assert!(ordered_concrete_stores(&map, &gk("nope"), true).is_empty());
        assert_eq!(names(&ordered_concrete_stores(&map, &hk("h1"), true)), vec!["h1"]);
    }

    #[test]
    fn reachability() {
        let map = map_of(vec![
            group("g1", &[gk("g2")]),
            group("g2", &[gk("g3")]),
            group("g3", &[hk("h1")]),
        ]);
        assert!(reaches(&map, &[gk("g2")], &gk("g3")));
        assert!(!reaches(&map, &[gk("g2")], &gk("g1")));
    }

    /// Random membership graph over `n` groups and `n` hosted stores.
    fn arbitrary_graph() -> impl Strategy<Value = StoreMap> {
        (1usize..6).prop_flat_map(|n| {
            proptest::collection::vec(proptest::collection::vec(0..2 * n, 0..6), n).prop_map(move |edges| {
                let key_of = |i: usize| if i < n { gk(&format!("g{i}")) } else { hk(&format!("h{}", i - n)) };
                let mut stores: Vec<ArtifactStore> = (0..n).map(|i| hosted(&format!("h{i}"))).collect();
                for (i, members) in edges.into_iter().enumerate() {
                    let mut group = Group::new(MAVEN, format!("g{i}"), vec![]);
                    for m in members {
                        group.add_constituent(key_of(m));
                    }
                    stores.push(group.into());
                }
                map_of(stores)
            })
        })
    }

    proptest! {
        #[test]
        fn flattening_never_repeats_and_is_stable(map in arbitrary_graph()) {
            for key in map.keys().filter(|k| !k.is_concrete()) {
                let first = ordered_stores_in_group(&map, key, false);
                let mut seen = HashSet::new();
                for store in &first {
                    prop_assert!(seen.insert(store.key().clone()));
                    prop_assert!(store.key() != key);
                }
                let second = ordered_stores_in_group(&map, key, false);
                prop_assert_eq!(names(&first), names(&second));

                let concrete = ordered_concrete_stores(&map, key, false);
                let expected: Vec<_> = first.iter().filter(|s| s.key().is_concrete()).cloned().collect();
                prop_assert_eq!(names(&concrete), names(&expected));
            }
        }
    }
}
