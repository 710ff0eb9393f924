//! Dry-run evaluation of the rule catalog.

use std::collections::BTreeSet;
use std::sync::Arc;

use depot_core::{ArtifactStore, StoreKey};
use depot_registry::StoreRegistry;
use serde::Serialize;

use crate::catalog::AutoProxCatalog;
use crate::error::Result;
use crate::METADATA_IMPLIED_BY;

/// What provisioning a key would create.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProvisionPlan {
    /// Name of the matching rule.
    pub rule: String,
    pub store: ArtifactStore,
    /// Missing group members the rule set would create alongside, depth first.
    pub supplemental: Vec<ArtifactStore>,
}

/// Shows what the catalog would provision, without validating or persisting.
pub struct AutoProxCalculator {
    registry: Arc<StoreRegistry>,
    catalog: Arc<AutoProxCatalog>,
}

impl AutoProxCalculator {
    pub fn new(registry: Arc<StoreRegistry>, catalog: Arc<AutoProxCatalog>) -> Self {
        AutoProxCalculator { registry, catalog }
    }

    /// The plan for `key`, or `None` when no rule produces it.
    ///
    /// Rule failures are returned rather than hidden.
    pub fn evaluate(&self, key: &StoreKey) -> Result<Option<ProvisionPlan>> {
        let Some(mapping) = self.catalog.mapping_matching(key) else {
            return Ok(None);
        };
        let Some(store) = self.catalog.create(key)? else {
            return Ok(None);
        };

        let mut visited = BTreeSet::from([key.clone()]);
        let mut supplemental = Vec::new();
        self.collect(&store, &mut visited, &mut supplemental)?;
        Ok(Some(ProvisionPlan {
            rule: mapping.name().to_string(),
            store,
            supplemental,
        }))
    }

    fn collect(
        &self,
        parent: &ArtifactStore,
        visited: &mut BTreeSet<StoreKey>,
        out: &mut Vec<ArtifactStore>,
    ) -> Result<()> {
        let Some(members) = parent.constituents() else {
            return Ok(());
        };
        for member in members {
            if !visited.insert(member.clone()) || self.registry.contains(member) {
                continue;
            }
            if let Some(mut store) = self.catalog.create(member)? {
                store.set_metadata(METADATA_IMPLIED_BY, parent.key().to_string());
                out.push(store.clone());
                self.collect(&store, visited, out)?;
            }
        }
        Ok(())
    }
}
