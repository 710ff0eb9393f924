//! `depot store`: store definition management.

use std::path::Path;

use anyhow::{bail, Context, Result};
use depot_core::{ArtifactStore, StoreType};
use depot_registry::{IfExists, StoreLookup, StoreRegistry};

use super::parse_key;

/// List stores, optionally narrowed by package type and store type.
pub fn list(registry: &StoreRegistry, package_type: Option<&str>, store_type: Option<&str>) -> Result<()> {
    let mut query = registry.query();
    if let Some(pt) = package_type {
        query = query.package_type(pt);
    }
    if let Some(st) = store_type {
        let st: StoreType = st.parse().with_context(|| format!("invalid store type '{st}'"))?;
        query = query.store_types(&[st]);
    }

    let stores = query.all();
    if stores.is_empty() {
        println!("No stores defined.");
        return Ok(());
    }
    for store in &stores {
        println!("  {:<45} {}", store.key().to_string(), describe(store));
    }
    println!();
    println!("{} store(s)", stores.len());
    Ok(())
}

fn describe(store: &ArtifactStore) -> String {
    let mut parts = Vec::new();
    match store {
        ArtifactStore::Remote(remote) => parts.push(remote.url.clone()),
        ArtifactStore::Hosted(hosted) if hosted.readonly => parts.push("readonly".to_string()),
        ArtifactStore::Hosted(_) => {}
        ArtifactStore::Group(group) => parts.push(format!("{} member(s)", group.constituents.len())),
    }
    if store.is_disabled() {
        parts.push("disabled".to_string());
    }
    if store.authoritative_index() {
        parts.push("authoritative".to_string());
    }
    parts.join(", ")
}

/// Print one store definition as JSON.
pub fn show(stores: &dyn StoreLookup, key: &str) -> Result<()> {
    let key = parse_key(key)?;
    let Some(store) = stores.lookup(&key)? else {
        bail!("no store {key}");
    };
    println!("{}", serde_json::to_string_pretty(store.as_ref())?);
    Ok(())
}

/// Create a store from a JSON definition file.
pub fn create(registry: &StoreRegistry, file: &Path, overwrite: bool) -> Result<()> {
    let content = std::fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;
    let store: ArtifactStore =
        serde_json::from_str(&content).with_context(|| format!("parsing {}", file.display()))?;
    let if_exists = if overwrite {
        IfExists::Overwrite
    } else {
        IfExists::Fail
    };
    let created = registry.create(store, if_exists)?;
    println!("Created {}", created.key());
    Ok(())
}

/// Delete a store and remove it from every group.
pub fn delete(registry: &StoreRegistry, key: &str) -> Result<()> {
    let key = parse_key(key)?;
    let affected = registry.query().groups_containing(&key);
    registry.delete(&key)?;
    println!("Deleted {key}");
    for group in affected {
        println!("  removed from {}", group.key());
    }
    Ok(())
}
