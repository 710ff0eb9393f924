//! The physical content layer, as seen by the resolver.
//!
//! Resolution only needs one question answered: does this concrete store
//! hold this path right now?

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use depot_core::{ArtifactStore, StoreKey};
use parking_lot::RwLock;

use crate::cache::normalize_path;
use crate::error::{IndexError, Result};

/// Answers whether a concrete store holds a path.
pub trait ContentSource: Send + Sync {
    fn exists(&self, store: &ArtifactStore, path: &str) -> Result<bool>;
}

/// Content laid out on disk per store.
///
/// Layout:
/// ```text
/// <root>/
///   <packageType>/
///     <storeType>/
///       <name>/
///         <path>
/// ```
pub struct FsContentSource {
    root: PathBuf,
}

impl FsContentSource {
    pub fn new(root: PathBuf) -> Self {
        FsContentSource { root }
    }

    /// Where `path` lives for `key`. Rejects paths that climb out of the store.
    pub fn content_path(&self, key: &StoreKey, path: &str) -> Result<PathBuf> {
        let relative = Path::new(path.trim_start_matches('/'));
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(IndexError::InvalidPath {
                path: path.to_string(),
            });
        }
        Ok(self
            .root
            .join(key.package_type())
            .join(key.store_type().as_str())
            .join(key.name())
            .join(relative))
    }
}

impl ContentSource for FsContentSource {
    fn exists(&self, store: &ArtifactStore, path: &str) -> Result<bool> {
        let file = self.content_path(store.key(), path)?;
        match std::fs::metadata(&file) {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(IndexError::Io { path: file, source }),
        }
    }
}

/// In-memory content, with a probe counter.
#[derive(Debug, Default)]
pub struct MemoryContentSource {
    content: RwLock<HashSet<(StoreKey, String)>>,
    probes: AtomicUsize,
}

impl MemoryContentSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, key: &StoreKey, path: &str) {
        self.content.write().insert((key.clone(), normalize_path(path)));
    }

    pub fn remove(&self, key: &StoreKey, path: &str) -> bool {
        self.content.write().remove(&(key.clone(), normalize_path(path)))
    }

    /// How many times `exists` has been called.
    pub fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }
}

impl ContentSource for MemoryContentSource {
    fn exists(&self, store: &ArtifactStore, path: &str) -> Result<bool> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .content
            .read()
            .contains(&(store.key().clone(), normalize_path(path))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use depot_core::{HostedRepository, MAVEN};

    #[test]
    fn fs_source_checks_files() {
        let dir = tempfile::tempdir().unwrap();
        let source = FsContentSource::new(dir.path().to_path_buf());
        let store: ArtifactStore = HostedRepository::new(MAVEN, "local").into();

        let file = source.content_path(store.key(), "/org/foo/1.0/foo.pom").unwrap();
        std::fs::create_dir_all(file.parent().unwrap()).unwrap();
        std::fs::write(&file, "<project/>").unwrap();

        assert!(source.exists(&store, "/org/foo/1.0/foo.pom").unwrap());
        assert!(!source.exists(&store, "/org/foo/1.0/foo.jar").unwrap());
        // Directories are not content.
        assert!(!source.exists(&store, "/org/foo").unwrap());
    }

    #[test]
    fn fs_source_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let source = FsContentSource::new(dir.path().to_path_buf());
        let store: ArtifactStore = HostedRepository::new(MAVEN, "local").into();
        assert!(matches!(
            source.exists(&store, "/../../etc/passwd"),
            Err(IndexError::InvalidPath { .. })
        ));
    }

    #[test]
    fn memory_source_counts_probes() {
        let source = MemoryContentSource::new();
        let store: ArtifactStore = HostedRepository::new(MAVEN, "local").into();
        source.add(store.key(), "a/b");
        assert!(source.exists(&store, "/a/b").unwrap());
        assert!(source.remove(store.key(), "/a/b"));
        assert!(!source.exists(&store, "/a/b").unwrap());
        assert_eq!(source.probes(), 2);
    }
}
