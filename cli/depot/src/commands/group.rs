//! `depot group flatten` and `depot affected`.

use anyhow::{bail, Result};
use depot_registry::StoreRegistry;

use super::parse_key;

/// Print the stores a group searches, in order.
pub fn flatten(registry: &StoreRegistry, key: &str, include_groups: bool, all: bool) -> Result<()> {
    let key = parse_key(key)?;
    if !registry.contains(&key) {
        bail!("no store {key}");
    }
    let enabled_only = !all;
    let stores = if include_groups {
        registry.ordered_stores_in_group(&key, enabled_only)
    } else {
        registry.ordered_concrete_stores(&key, enabled_only)
    };

    if stores.is_empty() {
        println!("{key} has no reachable stores.");
        return Ok(());
    }
    for (i, store) in stores.iter().enumerate() {
        let marker = if store.is_disabled() { " (disabled)" } else { "" };
        println!("  {:>3}. {}{marker}", i + 1, store.key());
    }
    Ok(())
}

/// Print every group that transitively contains any of `keys`.
pub fn affected(registry: &StoreRegistry, keys: &[String]) -> Result<()> {
    let keys = keys.iter().map(|k| parse_key(k)).collect::<Result<Vec<_>>>()?;
    let groups = registry.affected_by(&keys);
    if groups.is_empty() {
        println!("No groups contain these stores.");
        return Ok(());
    }
    for group in &groups {
        println!("  {group}");
    }
    Ok(())
}
