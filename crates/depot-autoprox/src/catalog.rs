//! The ordered rule set.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use depot_core::{ArtifactStore, RemoteRepository, StoreKey, StoreType};
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::config::AutoProxConfig;
use crate::error::{AutoProxError, Result};
use crate::mapping::RuleMapping;
use crate::rule::{AutoProxRule, RuleResult};
use crate::template::TomlRuleParser;
use crate::{AUTOPROX_ORIGIN, METADATA_ORIGIN};

/// Turns rule source text into a mapping.
///
/// The catalog only knows rule files by extension; how a rule is authored is
/// up to the parser.
pub trait RuleParser: Send + Sync {
    /// File extension of rule files, without the dot.
    fn extension(&self) -> &str;

    fn parse(&self, name: &str, spec: &str) -> Result<RuleMapping>;
}

/// Rules in match order: specific rules by name, then `default` rules.
pub struct AutoProxCatalog {
    rules: RwLock<Vec<RuleMapping>>,
    enabled: AtomicBool,
    parser: Box<dyn RuleParser>,
    rules_dir: Option<PathBuf>,
}

impl AutoProxCatalog {
    /// An empty catalog. Call [`reload`](Self::reload) to read `rules_dir`.
    pub fn new(parser: Box<dyn RuleParser>, rules_dir: Option<PathBuf>, enabled: bool) -> Self {
        AutoProxCatalog {
            rules: RwLock::new(Vec::new()),
            enabled: AtomicBool::new(enabled),
            parser,
            rules_dir,
        }
    }

    /// An enabled, in-memory catalog holding `rules`.
    pub fn with_rules(rules: Vec<RuleMapping>) -> Self {
        let catalog = Self::new(Box::new(TomlRuleParser), None, true);
        for mapping in rules {
            catalog.add_mapping(mapping);
        }
        catalog
    }

    /// Build a catalog of TOML rules from configuration.
    pub fn load(config: &AutoProxConfig) -> Result<Self> {
        let catalog = Self::new(Box::new(TomlRuleParser), config.rules_dir.clone(), config.enabled);
        catalog.reload()?;
        Ok(catalog)
    }

    /// Re-read every rule file. Files that fail to parse are logged and skipped.
    ///
    /// Returns the number of rules loaded.
    pub fn reload(&self) -> Result<usize> {
        let Some(dir) = &self.rules_dir else {
            return Ok(self.rules.read().len());
        };
        if !dir.is_dir() {
            debug!(dir = %dir.display(), "no autoprox rules directory");
            self.rules.write().clear();
            return Ok(0);
        }

        let entries = std::fs::read_dir(dir).map_err(|source| AutoProxError::RuleFile {
            path: dir.clone(),
            source,
        })?;
        let mut loaded = Vec::new();
        for entry in entries {
            let path = entry
                .map_err(|source| AutoProxError::RuleFile {
                    path: dir.clone(),
                    source,
                })?
                .path();
            if path.extension().and_then(|e| e.to_str()) != Some(self.parser.extension()) {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match self.read_rule(name, &path) {
                Ok(mapping) => loaded.push(mapping),
                Err(e) => warn!(file = %path.display(), error = %e, "skipping autoprox rule"),
            }
        }
        loaded.sort_by(|a, b| a.precedence(b));

        let count = loaded.len();
        *self.rules.write() = loaded;
        info!(dir = %dir.display(), rules = count, "loaded autoprox rules");
        Ok(count)
    }

    fn read_rule(&self, name: &str, path: &Path) -> Result<RuleMapping> {
        let text = std::fs::read_to_string(path).map_err(|source| AutoProxError::RuleFile {
            path: path.to_path_buf(),
            source,
        })?;
        self.parser.parse(name, &text)
    }

    /// Insert or replace a mapping, keeping match order.
    pub fn add_mapping(&self, mapping: RuleMapping) {
        let mut rules = self.rules.write();
        rules.retain(|r| r.name() != mapping.name());
        rules.push(mapping);
        rules.sort_by(|a, b| a.precedence(b));
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
        info!(enabled, "autoprox toggled");
    }

    /// All rules, in match order.
    pub fn rules(&self) -> Vec<RuleMapping> {
        self.rules.read().clone()
    }

    pub fn rule_named(&self, name: &str) -> Option<RuleMapping> {
        self.rules.read().iter().find(|r| r.name() == name).cloned()
    }

    /// The first rule matching `key`, or `None` when disabled.
    pub fn mapping_matching(&self, key: &StoreKey) -> Option<RuleMapping> {
        if !self.is_enabled() {
            return None;
        }
        self.rules.read().iter().find(|r| r.matches(key)).cloned()
    }

    /// Parse and install a rule, writing it to the rules directory if there is one.
    ///
    /// Storing the same text under the same name again changes nothing.
    pub fn store_rule(&self, name: &str, spec: &str) -> Result<RuleMapping> {
        check_rule_name(name)?;
        if let Some(existing) = self.rule_named(name) {
            if existing.spec() == Some(spec) {
                return Ok(existing);
            }
        }

        let mapping = self.parser.parse(name, spec)?;
        if let Some(path) = self.rule_path(name) {
            if let Some(dir) = path.parent() {
                std::fs::create_dir_all(dir).map_err(|source| AutoProxError::RuleFile {
                    path: dir.to_path_buf(),
                    source,
                })?;
            }
            std::fs::write(&path, spec).map_err(|source| AutoProxError::RuleFile { path, source })?;
        }
        self.add_mapping(mapping.clone());
        info!(rule = name, "stored autoprox rule");
        Ok(mapping)
    }

    /// Remove a rule and its file.
    pub fn remove_rule(&self, name: &str) -> Result<RuleMapping> {
        let removed = {
            let mut rules = self.rules.write();
            let pos = rules
                .iter()
                .position(|r| r.name() == name)
                .ok_or_else(|| AutoProxError::RuleNotFound { name: name.to_string() })?;
            rules.remove(pos)
        };
        if let Some(path) = self.rule_path(name) {
            match std::fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(source) => return Err(AutoProxError::RuleFile { path, source }),
            }
        }
        info!(rule = name, "removed autoprox rule");
        Ok(removed)
    }

    fn rule_path(&self, name: &str) -> Option<PathBuf> {
        self.rules_dir
            .as_ref()
            .map(|dir| dir.join(format!("{name}.{}", self.parser.extension())))
    }

    /// Ask the first matching rule to create the store for `key`.
    ///
    /// `Ok(None)` when nothing matches or the rule does not produce this
    /// store type. Rule failures, including panics, come back as
    /// [`AutoProxError::RuleExecution`].
    pub fn create(&self, key: &StoreKey) -> Result<Option<ArtifactStore>> {
        let Some(mapping) = self.mapping_matching(key) else {
            return Ok(None);
        };
        let produced = run_rule(&mapping, key, |rule| match key.store_type() {
            StoreType::Remote => rule.create_remote(key).map(|r| r.map(ArtifactStore::from)),
            StoreType::Hosted => rule.create_hosted(key).map(|h| h.map(ArtifactStore::from)),
            StoreType::Group => rule.create_group(key).map(|g| g.map(ArtifactStore::from)),
        })?;
        let Some(mut store) = produced else {
            debug!(rule = mapping.name(), key = %key, "rule produced nothing");
            return Ok(None);
        };

        if store.key() != key {
            return Err(AutoProxError::RuleExecution {
                rule: mapping.name().to_string(),
                key: key.to_string(),
                detail: format!("produced {} instead", store.key()),
            });
        }
        store.set_metadata(METADATA_ORIGIN, AUTOPROX_ORIGIN);
        Ok(Some(store))
    }

    /// The remote to probe and the path to probe on it, when the matching
    /// rule validates before creating.
    pub fn validation_for(&self, key: &StoreKey) -> Result<Option<(RemoteRepository, String)>> {
        let Some(mapping) = self.mapping_matching(key) else {
            return Ok(None);
        };
        if !mapping.rule().is_validation_enabled() {
            return Ok(None);
        }
        let remote = run_rule(&mapping, key, |rule| rule.create_validation_remote(key))?;
        let path = mapping.rule().validation_path().unwrap_or_else(|| "/".to_string());
        Ok(remote.map(|r| (r, path)))
    }
}

impl std::fmt::Debug for AutoProxCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AutoProxCatalog")
            .field("rules", &*self.rules.read())
            .field("enabled", &self.is_enabled())
            .field("rules_dir", &self.rules_dir)
            .finish()
    }
}

fn run_rule<T>(
    mapping: &RuleMapping,
    key: &StoreKey,
    f: impl FnOnce(&dyn AutoProxRule) -> RuleResult<T>,
) -> Result<Option<T>> {
    let failed = |detail: String| AutoProxError::RuleExecution {
        rule: mapping.name().to_string(),
        key: key.to_string(),
        detail,
    };
    match catch_unwind(AssertUnwindSafe(|| f(mapping.rule()))) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(failed(e.0)),
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(failed(format!("panicked: {message}")))
        }
    }
}

fn check_rule_name(name: &str) -> Result<()> {
    let bad = name.is_empty()
        || name.starts_with('.')
        || name.chars().any(|c| matches!(c, '/' | '\\' | ':') || c.is_control());
    if bad {
        return Err(AutoProxError::InvalidRule {
            name: name.to_string(),
            detail: "rule names must be plain file names".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::MatchExpression;
    use crate::rule::RuleError;
    use depot_core::{HostedRepository, MAVEN};
    use std::sync::Arc;

    const TEMP: &str = "match = \"temp-*\"\n[remote]\nurl = \"https://${1}.example.com/\"\n";
    const DEFAULT: &str = "match = \"default\"\n[hosted]\n";

    struct Panics;
    impl AutoProxRule for Panics {
        fn create_hosted(&self, _key: &StoreKey) -> RuleResult<HostedRepository> {
            panic!("rule blew up");
        }
    }

    struct Fails;
    impl AutoProxRule for Fails {
        fn create_hosted(&self, _key: &StoreKey) -> RuleResult<HostedRepository> {
            Err(RuleError::new("no upstream configured"))
        }
    }

    struct WrongKey;
    impl AutoProxRule for WrongKey {
        fn create_hosted(&self, _key: &StoreKey) -> RuleResult<HostedRepository> {
            Ok(Some(HostedRepository::new(MAVEN, "elsewhere")))
        }
    }

    fn catalog() -> AutoProxCatalog {
        let catalog = AutoProxCatalog::with_rules(Vec::new());
        catalog.store_rule("temp", TEMP).unwrap();
        catalog.store_rule("catch-all", DEFAULT).unwrap();
        catalog
    }

    fn custom(rule: impl AutoProxRule + 'static) -> AutoProxCatalog {
        AutoProxCatalog::with_rules(vec![RuleMapping::new(
            "custom",
            MatchExpression::Default,
            Arc::new(rule),
        )])
    }

    #[test]
    fn specific_rule_wins_over_default() {
        let catalog = catalog();
        let matched = catalog.mapping_matching(&StoreKey::remote(MAVEN, "temp-build-42")).unwrap();
        assert_eq!(matched.name(), "temp");
        let matched = catalog.mapping_matching(&StoreKey::remote(MAVEN, "anything-else")).unwrap();
        assert_eq!(matched.name(), "catch-all");
    }

    #[test]
    fn create_stamps_origin() {
        let catalog = catalog();
        let key = StoreKey::remote(MAVEN, "temp-alpha");
        let store = catalog.create(&key).unwrap().unwrap();
        assert_eq!(store.key(), &key);
        assert_eq!(store.metadata(METADATA_ORIGIN), Some(AUTOPROX_ORIGIN));
    }

    #[test]
    fn unsupported_store_type_is_absent() {
        let catalog = catalog();
        assert!(catalog.create(&StoreKey::group(MAVEN, "temp-alpha")).unwrap().is_none());
    }

    #[test]
    fn disabled_catalog_matches_nothing() {
        let catalog = catalog();
        catalog.set_enabled(false);
        assert!(catalog.create(&StoreKey::remote(MAVEN, "temp-alpha")).unwrap().is_none());
        catalog.set_enabled(true);
        assert!(catalog.create(&StoreKey::remote(MAVEN, "temp-alpha")).unwrap().is_some());
    }

    #[test]
    fn rule_failures_are_attributed() {
        let key = StoreKey::hosted(MAVEN, "x");
        for catalog in [custom(Panics), custom(Fails), custom(WrongKey)] {
            match catalog.create(&key) {
                Err(AutoProxError::RuleExecution { rule, key: k, .. }) => {
                    assert_eq!(rule, "custom");
                    assert_eq!(k, key.to_string());
                }
                other => panic!("expected rule failure, got {other:?}"),
            }
        }
    }

    #[test]
    fn store_rule_is_idempotent_and_replaces() {
        let catalog = catalog();
        catalog.store_rule("temp", TEMP).unwrap();
        assert_eq!(catalog.rules().len(), 2);

        catalog
            .store_rule("temp", "match = \"tmp-*\"\n[remote]\nurl = \"https://x/\"\n")
            .unwrap();
        assert_eq!(catalog.rules().len(), 2);
        assert_eq!(catalog.mapping_matching(&StoreKey::remote(MAVEN, "tmp-1")).unwrap().name(), "temp");
    }

    #[test]
    fn rules_persist_to_directory() {
        let dir = tempfile::tempdir().unwrap();
        let config = AutoProxConfig {
            rules_dir: Some(dir.path().join("rules")),
            ..AutoProxConfig::default()
        };
        let catalog = AutoProxCatalog::load(&config).unwrap();
        assert!(catalog.rules().is_empty());

        catalog.store_rule("temp", TEMP).unwrap();
        catalog.store_rule("catch-all", DEFAULT).unwrap();
        assert!(dir.path().join("rules/temp.toml").is_file());

        let reloaded = AutoProxCatalog::load(&config).unwrap();
        let names: Vec<String> = reloaded.rules().iter().map(|r| r.name().to_string()).collect();
        assert_eq!(names, vec!["temp", "catch-all"]);

        reloaded.remove_rule("temp").unwrap();
        assert!(!dir.path().join("rules/temp.toml").exists());
        assert!(matches!(
            reloaded.remove_rule("temp"),
            Err(AutoProxError::RuleNotFound { .. })
        ));
    }

    #[test]
    fn reload_skips_broken_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("good.toml"), TEMP).unwrap();
        std::fs::write(dir.path().join("bad.toml"), "match = ").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();
        let config = AutoProxConfig {
            rules_dir: Some(dir.path().to_path_buf()),
            ..AutoProxConfig::default()
        };
        let catalog = AutoProxCatalog::load(&config).unwrap();
        assert_eq!(catalog.rules().len(), 1);
        assert!(catalog.rule_named("good").is_some());
    }

    #[test]
    fn rule_names_must_be_file_names() {
        let catalog = catalog();
        assert!(matches!(
            catalog.store_rule("../escape", TEMP),
            Err(AutoProxError::InvalidRule { .. })
        ));
    }

    #[test]
    fn validation_defaults_to_root_path() {
        let checked = AutoProxCatalog::with_rules(Vec::new());
        checked
            .store_rule(
                "checked",
                "match = \"default\"\n[remote]\nurl = \"https://up.example.com/\"\n[validation]\n",
            )
            .unwrap();
        let (remote, path) = checked
            .validation_for(&StoreKey::remote(MAVEN, "x"))
            .unwrap()
            .unwrap();
        assert_eq!(remote.url, "https://up.example.com/");
        assert_eq!(path, "/");

        let unchecked = catalog();
        assert!(unchecked
            .validation_for(&StoreKey::remote(MAVEN, "temp-a"))
            .unwrap()
            .is_none());
    }
}
