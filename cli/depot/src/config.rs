//! `depot.toml` parsing and discovery.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use depot_autoprox::AutoProxConfig;
use depot_index::IndexConfig;
use depot_registry::RegistryConfig;
use serde::{Deserialize, Serialize};

pub const CONFIG_FILE: &str = "depot.toml";

/// The whole `depot.toml`. Every section is optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DepotConfig {
    /// Store definitions and hosted content live under here.
    pub data_dir: PathBuf,
    /// Default log filter when `RUST_LOG` is unset.
    pub log_level: Option<String>,
    pub registry: RegistryConfig,
    pub index: IndexConfig,
    pub autoprox: AutoProxConfig,
}

impl Default for DepotConfig {
    fn default() -> Self {
        DepotConfig {
            data_dir: PathBuf::from("data"),
            log_level: None,
            registry: RegistryConfig::default(),
            index: IndexConfig::default(),
            autoprox: AutoProxConfig::default(),
        }
    }
}

impl DepotConfig {
    /// Search upward from `start_dir` for a `depot.toml`, returning it and the
    /// directory it was found in.
    pub fn find_and_load(start_dir: &Path) -> Result<Option<(Self, PathBuf)>> {
        let mut dir = start_dir.to_path_buf();
        loop {
            let candidate = dir.join(CONFIG_FILE);
            if candidate.is_file() {
                return Ok(Some((Self::load(&candidate)?, dir)));
            }
            if !dir.pop() {
                break;
            }
        }
        Ok(None)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn parse(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    /// Anchor relative paths at `base`. Rules default to `<data_dir>/autoprox`.
    pub fn resolve_paths(&mut self, base: &Path) {
        if self.data_dir.is_relative() {
            self.data_dir = base.join(&self.data_dir);
        }
        let rules = match self.autoprox.rules_dir.take() {
            Some(dir) if dir.is_relative() => base.join(dir),
            Some(dir) => dir,
            None => self.data_dir.join("autoprox"),
        };
        self.autoprox.rules_dir = Some(rules);
    }

    pub fn stores_dir(&self) -> PathBuf {
        self.data_dir.join("stores")
    }

    pub fn content_dir(&self) -> PathBuf {
        self.data_dir.join("content")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_config() {
        let config = DepotConfig::parse(
            r#"
data_dir = "/var/lib/depot"
log_level = "info"

[registry]
lock_timeout_ms = 1000
event_workers = 2

[index]
enabled = false

[autoprox]
rules_dir = "rules"
validation_timeout_ms = 750
"#,
        )
        .unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/depot"));
        assert_eq!(config.log_level.as_deref(), Some("info"));
        assert_eq!(config.registry.lock_timeout_ms, 1000);
        assert_eq!(config.registry.event_workers, 2);
        assert!(config.registry.reject_cycles);
        assert!(!config.index.enabled);
        assert_eq!(config.autoprox.validation_timeout_ms, 750);
    }

    #[test]
    fn empty_config_is_default() {
        assert_eq!(DepotConfig::parse("").unwrap(), DepotConfig::default());
    }

    #[test]
    fn reject_unparseable_config() {
        assert!(DepotConfig::parse("data_dir = [").is_err());
        assert!(DepotConfig::parse("[registry]\nlock_timeout_ms = \"soon\"\n").is_err());
    }

    #[test]
    fn relative_paths_anchor_at_config_dir() {
        let mut config = DepotConfig::default();
        config.resolve_paths(Path::new("/srv/depot"));
        assert_eq!(config.data_dir, PathBuf::from("/srv/depot/data"));
        assert_eq!(config.autoprox.rules_dir, Some(PathBuf::from("/srv/depot/data/autoprox")));
        assert_eq!(config.stores_dir(), PathBuf::from("/srv/depot/data/stores"));

        let mut config = DepotConfig::parse("[autoprox]\nrules_dir = \"rules\"\n").unwrap();
        config.resolve_paths(Path::new("/srv/depot"));
        assert_eq!(config.autoprox.rules_dir, Some(PathBuf::from("/srv/depot/rules")));
    }

    #[test]
    fn find_and_load_walks_up() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "log_level = \"debug\"\n").unwrap();
        let nested = dir.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();

        let (config, found) = DepotConfig::find_and_load(&nested).unwrap().unwrap();
        assert_eq!(config.log_level.as_deref(), Some("debug"));
        assert_eq!(found, dir.path());
    }
}
