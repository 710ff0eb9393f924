//! `depot autoprox`: rule catalog management and dry runs.

use std::path::Path;

use anyhow::{Context, Result};

use super::parse_key;
use crate::context::Depot;

/// List rules in match order.
pub fn rules(depot: &Depot) -> Result<()> {
    let rules = depot.catalog.rules();
    if !depot.catalog.is_enabled() {
        println!("AutoProx is disabled.");
    }
    if rules.is_empty() {
        println!("No autoprox rules.");
        return Ok(());
    }
    for rule in &rules {
        println!("  {:<25} {}", rule.name(), rule.expression());
    }
    Ok(())
}

/// Show what the catalog would create for `key`, without creating it.
pub fn eval(depot: &Depot, key: &str) -> Result<()> {
    let key = parse_key(key)?;
    match depot.calculator().evaluate(&key)? {
        Some(plan) => println!("{}", serde_json::to_string_pretty(&plan)?),
        None => println!("No rule creates {key}."),
    }
    Ok(())
}

/// Install (or replace) a rule from a file.
pub fn add(depot: &Depot, name: &str, file: &Path) -> Result<()> {
    let spec = std::fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;
    let mapping = depot.catalog.store_rule(name, &spec)?;
    println!("Stored rule '{}' matching {}", mapping.name(), mapping.expression());
    Ok(())
}

pub fn remove(depot: &Depot, name: &str) -> Result<()> {
    depot.catalog.remove_rule(name)?;
    println!("Removed rule '{name}'");
    Ok(())
}
