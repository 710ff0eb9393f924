//! CLI command implementations.

pub mod autoprox;
pub mod group;
pub mod locate;
pub mod store;

use anyhow::{Context, Result};
use depot_core::StoreKey;

/// Parse a `packageType:storeType:name` argument.
pub fn parse_key(input: &str) -> Result<StoreKey> {
    StoreKey::parse(input).with_context(|| format!("invalid store key '{input}'"))
}
