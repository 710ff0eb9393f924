//! Provisioning stores on a registry miss.
//!
//! [`AutoProxResolver`] wraps the registry: a lookup that finds the store
//! returns it untouched, a lookup that misses asks the catalog for a
//! definition, checks it, and persists it through the registry so the usual
//! change events fire. Anything that goes wrong on the way makes the store
//! absent rather than failing the lookup.

use std::sync::Arc;
use std::time::{Duration, Instant};

use depot_core::{ArtifactStore, StoreKey};
use depot_registry::{IfExists, KeyLocks, RegistryError, Result, StoreLookup, StoreRegistry};
use tracing::{debug, info, trace, warn};

use crate::catalog::AutoProxCatalog;
use crate::config::AutoProxConfig;
use crate::validate::RemoteValidator;
use crate::METADATA_IMPLIED_BY;

/// Registry lookups that provision missing stores from the rule catalog.
pub struct AutoProxResolver {
    registry: Arc<StoreRegistry>,
    catalog: Arc<AutoProxCatalog>,
    validator: Arc<dyn RemoteValidator>,
    creation_locks: KeyLocks,
    validation_timeout: Duration,
}

impl AutoProxResolver {
    pub fn new(
        registry: Arc<StoreRegistry>,
        catalog: Arc<AutoProxCatalog>,
        validator: Arc<dyn RemoteValidator>,
        config: &AutoProxConfig,
    ) -> Self {
        let creation_locks = KeyLocks::new(registry.config().lock_timeout());
        AutoProxResolver {
            registry,
            catalog,
            validator,
            creation_locks,
            validation_timeout: config.validation_timeout(),
        }
    }

    pub fn catalog(&self) -> &AutoProxCatalog {
        &self.catalog
    }

    /// The store for `key`, provisioning it if a rule allows.
    pub fn get(&self, key: &StoreKey) -> Result<Option<Arc<ArtifactStore>>> {
        self.get_with_deadline(key, None)
    }

    /// Like [`get`](Self::get), but upstream validation gives up at `deadline`.
    pub fn get_with_deadline(&self, key: &StoreKey, deadline: Option<Instant>) -> Result<Option<Arc<ArtifactStore>>> {
        self.resolve(key, deadline, None, &mut Vec::new())
    }

    fn resolve(
        &self,
        key: &StoreKey,
        deadline: Option<Instant>,
        implied_by: Option<&StoreKey>,
        chain: &mut Vec<StoreKey>,
    ) -> Result<Option<Arc<ArtifactStore>>> {
        if let Some(existing) = self.registry.get(key) {
            return Ok(Some(existing));
        }
        if !self.catalog.is_enabled() || chain.contains(key) {
            return Ok(None);
        }
        if self.catalog.mapping_matching(key).is_none() {
            trace!(key = %key, "no autoprox rule matches");
            return Ok(None);
        }

        // One provisioning attempt per key at a time; later callers see the result.
        let _guard = match self.creation_locks.lock(key) {
            Ok(guard) => guard,
            Err(e @ RegistryError::LockTimeout { .. }) => {
                warn!(key = %key, error = %e, "gave up waiting for concurrent provisioning");
                return Ok(self.registry.get(key));
            }
            Err(e) => return Err(e),
        };
        if let Some(existing) = self.registry.get(key) {
            return Ok(Some(existing));
        }

        chain.push(key.clone());
        let provisioned = self.provision(key, deadline, chain);
        chain.pop();

        let Some(mut store) = provisioned else {
            return Ok(None);
        };
        if let Some(parent) = implied_by {
            store.set_metadata(METADATA_IMPLIED_BY, parent.to_string());
        }

        match self.registry.create(store, IfExists::Skip) {
            Ok(created) => {
                info!(key = %key, "provisioned store");
                Ok(Some(created))
            }
            Err(e @ RegistryError::ValidationFailed { .. }) => {
                warn!(key = %key, error = %e, "provisioned store rejected");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn provision(&self, key: &StoreKey, deadline: Option<Instant>, chain: &mut Vec<StoreKey>) -> Option<ArtifactStore> {
        let mut store = match self.catalog.create(key) {
            Ok(Some(store)) => store,
            Ok(None) => {
                debug!(key = %key, "no autoprox rule produces this store");
                return None;
            }
            Err(e) => {
                warn!(key = %key, error = %e, "autoprox rule failed");
                return None;
            }
        };

        let validated = match &store {
            ArtifactStore::Remote(_) | ArtifactStore::Group(_) => self.validate(key, deadline),
            ArtifactStore::Hosted(_) => true,
        };
        if !validated {
            return None;
        }

        match &mut store {
            ArtifactStore::Group(group) => {
                let candidates = std::mem::take(&mut group.constituents);
                for member in candidates {
                    match self.resolve(&member, deadline, Some(key), chain) {
                        Ok(Some(_)) => group.constituents.push(member),
                        Ok(None) => debug!(group = %key, member = %member, "dropping unresolvable member"),
                        Err(e) => warn!(group = %key, member = %member, error = %e, "dropping member"),
                    }
                }
                if group.constituents.is_empty() {
                    debug!(key = %key, "provisioned group would be empty");
                    return None;
                }
            }
            ArtifactStore::Remote(_) | ArtifactStore::Hosted(_) => {}
        }
        Some(store)
    }

    fn validate(&self, key: &StoreKey, deadline: Option<Instant>) -> bool {
        let (remote, path) = match self.catalog.validation_for(key) {
            Ok(Some(target)) => target,
            Ok(None) => return true,
            Err(e) => {
                warn!(key = %key, error = %e, "cannot build validation remote");
                return false;
            }
        };

        let timeout = match deadline {
            Some(deadline) => deadline
                .saturating_duration_since(Instant::now())
                .min(self.validation_timeout),
            None => self.validation_timeout,
        };
        if timeout.is_zero() {
            warn!(key = %key, "deadline passed before validation");
            return false;
        }
        self.validator.validate(&remote, &path, timeout)
    }
}

impl StoreLookup for AutoProxResolver {
    fn lookup(&self, key: &StoreKey) -> Result<Option<Arc<ArtifactStore>>> {
        self.get(key)
    }

    fn registry(&self) -> &StoreRegistry {
        &self.registry
    }
}
