//! Persistence backends for store definitions.
//!
//! The `StorePersistence` trait abstracts over where definitions live. The
//! registry writes through it before publishing a change and reads everything
//! back once at startup.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use depot_core::{ArtifactStore, StoreKey, StoreType};
use parking_lot::Mutex;
use tracing::warn;

use crate::error::{RegistryError, Result};

/// Durable storage for store definitions.
pub trait StorePersistence: Send + Sync {
    /// Write (or overwrite) a definition.
    fn save(&self, store: &ArtifactStore) -> Result<()>;

    /// Read one definition.
    fn load(&self, key: &StoreKey) -> Result<Option<ArtifactStore>>;

    /// Read every definition.
    fn load_all(&self) -> Result<Vec<ArtifactStore>>;

    /// Remove a definition. Removing an absent key is not an error.
    fn delete(&self, key: &StoreKey) -> Result<()>;
}

/// Keeps definitions in process memory only.
#[derive(Debug, Default)]
pub struct MemoryPersistence {
    stores: Mutex<HashMap<StoreKey, ArtifactStore>>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorePersistence for MemoryPersistence {
    fn save(&self, store: &ArtifactStore) -> Result<()> {
        self.stores.lock().insert(store.key().clone(), store.clone());
        Ok(())
    }

    fn load(&self, key: &StoreKey) -> Result<Option<ArtifactStore>> {
        Ok(self.stores.lock().get(key).cloned())
    }

    fn load_all(&self) -> Result<Vec<ArtifactStore>> {
        Ok(self.stores.lock().values().cloned().collect())
    }

    fn delete(&self, key: &StoreKey) -> Result<()> {
        self.stores.lock().remove(key);
        Ok(())
    }
}

/// One JSON file per store.
///
/// Layout:
/// ```text
/// <root>/
///   <packageType>/
///     <storeType>/
///       <name>.json
/// ```
pub struct FlatFilePersistence {
    root: PathBuf,
}

impl FlatFilePersistence {
    pub fn new(root: PathBuf) -> Self {
        FlatFilePersistence { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn store_path(&self, key: &StoreKey) -> PathBuf {
        self.root
            .join(encode_segment(key.package_type()))
            .join(key.store_type().as_str())
            .join(format!("{}.json", encode_segment(key.name())))
    }

    fn read_file(path: &Path) -> Result<ArtifactStore> {
        let data = std::fs::read_to_string(path).map_err(|e| RegistryError::Persistence {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
        let store = serde_json::from_str(&data)?;
        Ok(store)
    }
}

impl StorePersistence for FlatFilePersistence {
    fn save(&self, store: &ArtifactStore) -> Result<()> {
        let path = self.store_path(store.key());
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        // Write then rename so readers never see a half-written file.
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_string_pretty(store)?)?;
        std::fs::rename(&tmp, &path).map_err(|e| RegistryError::Persistence {
            path: path.clone(),
            detail: e.to_string(),
        })?;
        Ok(())
    }

    fn load(&self, key: &StoreKey) -> Result<Option<ArtifactStore>> {
        let path = self.store_path(key);
        if !path.is_file() {
            return Ok(None);
        }
        Self::read_file(&path).map(Some)
    }

    fn load_all(&self) -> Result<Vec<ArtifactStore>> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }

        let mut stores = Vec::new();
        for package_dir in std::fs::read_dir(&self.root)? {
            let package_dir = package_dir?.path();
            if !package_dir.is_dir() {
                continue;
            }
            for store_type in StoreType::ALL {
                let type_dir = package_dir.join(store_type.as_str());
                if !type_dir.is_dir() {
                    continue;
                }
                for entry in std::fs::read_dir(&type_dir)? {
                    let path = entry?.path();
                    if path.extension().and_then(|e| e.to_str()) != Some("json") {
                        continue;
                    }
                    match Self::read_file(&path) {
                        Ok(store) => stores.push(store),
                        Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable store definition"),
                    }
                }
            }
        }
        Ok(stores)
    }

    fn delete(&self, key: &StoreKey) -> Result<()> {
        let path = self.store_path(key);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(RegistryError::Persistence {
                path,
                detail: e.to_string(),
            }),
        }
    }
}

/// Escape characters that cannot appear in a single path segment.
fn encode_segment(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '%' => out.push_str("%25"),
            '/' => out.push_str("%2F"),
            '\\' => out.push_str("%5C"),
            ':' => out.push_str("%3A"),
            _ => out.push(c),
        }
    }
    out
}
