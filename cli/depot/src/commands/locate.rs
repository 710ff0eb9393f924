//! `depot locate`: which store serves a path.

use anyhow::Result;

use super::parse_key;
use crate::context::Depot;

pub fn run(depot: &Depot, key: &str, path: &str, all: bool) -> Result<()> {
    let key = parse_key(key)?;
    if all {
        let holders = depot.content.locate_all(&key, path)?;
        if holders.is_empty() {
            println!("{path} not found through {key}");
        }
        for holder in holders {
            println!("  {holder}");
        }
        return Ok(());
    }

    match depot.content.locate(&key, path)? {
        Some(origin) => println!("{origin}"),
        None => println!("{path} not found through {key}"),
    }
    Ok(())
}
