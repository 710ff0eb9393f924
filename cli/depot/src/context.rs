//! Wiring the core components from configuration.

use std::sync::Arc;

use anyhow::{Context, Result};
use depot_autoprox::{AutoProxCalculator, AutoProxCatalog, AutoProxResolver, HttpRemoteValidator};
use depot_index::{attach, ContentIndex, ContentResolver, FsContentSource};
use depot_registry::{EventDispatcher, FlatFilePersistence, StoreRegistry};
use tracing::debug;

use crate::config::DepotConfig;

/// Everything a command may need, backed by the configured data directory.
pub struct Depot {
    pub registry: Arc<StoreRegistry>,
    pub catalog: Arc<AutoProxCatalog>,
    pub resolver: Arc<AutoProxResolver>,
    pub content: ContentResolver,
}

impl Depot {
    pub fn open(config: &DepotConfig) -> Result<Self> {
        let events = EventDispatcher::new(&config.registry).context("starting event workers")?;
        let registry = Arc::new(StoreRegistry::new(
            Box::new(FlatFilePersistence::new(config.stores_dir())),
            events,
            config.registry.clone(),
        ));
        let loaded = registry.load().context("loading store definitions")?;
        debug!(loaded, dir = %config.stores_dir().display(), "registry ready");

        let index = Arc::new(ContentIndex::new(&config.index));
        attach(&registry, Arc::clone(&index));

        let catalog = Arc::new(AutoProxCatalog::load(&config.autoprox).context("loading autoprox rules")?);
        let resolver = Arc::new(AutoProxResolver::new(
            Arc::clone(&registry),
            Arc::clone(&catalog),
            Arc::new(HttpRemoteValidator::new()),
            &config.autoprox,
        ));
        let content = ContentResolver::new(
            resolver.clone(),
            index,
            Arc::new(FsContentSource::new(config.content_dir())),
        );

        Ok(Depot {
            registry,
            catalog,
            resolver,
            content,
        })
    }

    pub fn calculator(&self) -> AutoProxCalculator {
        AutoProxCalculator::new(Arc::clone(&self.registry), Arc::clone(&self.catalog))
    }

    /// Let pooled event listeners finish before the process exits.
    pub fn close(&self) {
        self.registry.events().quiesce();
    }
}
