//! TOML rule templates.
//!
//! A template describes the stores a rule creates, with `${...}`
//! placeholders filled in from the requested key:
//!
//! ```toml
//! match = "temp-*"
//! package_types = ["maven"]
//!
//! [remote]
//! url = "https://${1}.repo.example.com/maven2/"
//!
//! [hosted]
//! allow_snapshots = true
//!
//! [group]
//! constituents = ["hosted:${name}", "remote:${name}", "group:public"]
//!
//! [validation]
//! path = "/org/"
//! ```
//!
//! Placeholders: `${name}` and `${package_type}` of the requested key, and
//! `${1}`, `${2}`, ... from the match expression (the text after a prefix,
//! or regex groups). A constituent written `storeType:name` takes the
//! requested key's package type.

use std::collections::BTreeMap;
use std::sync::Arc;

use depot_core::{Group, HostedRepository, RemoteRepository, StoreKey, StoreType};
use regex::Regex;
use serde::Deserialize;

use crate::catalog::RuleParser;
use crate::error::{AutoProxError, Result};
use crate::mapping::{MatchExpression, RuleMapping};
use crate::rule::{AutoProxRule, RuleError, RuleResult};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct TemplateSpec {
    #[serde(rename = "match")]
    expression: String,
    #[serde(default)]
    package_types: Vec<String>,
    remote: Option<RemoteSection>,
    hosted: Option<HostedSection>,
    group: Option<GroupSection>,
    validation: Option<ValidationSection>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct RemoteSection {
    url: String,
    timeout_seconds: Option<u32>,
    #[serde(default)]
    cache_timeout_seconds: u32,
    #[serde(default)]
    passthrough: bool,
    user: Option<String>,
    password: Option<String>,
    description: Option<String>,
    #[serde(default)]
    metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct HostedSection {
    #[serde(default = "default_true")]
    allow_releases: bool,
    #[serde(default)]
    allow_snapshots: bool,
    #[serde(default)]
    readonly: bool,
    #[serde(default)]
    authoritative_index: bool,
    description: Option<String>,
    #[serde(default)]
    metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct GroupSection {
    #[serde(default)]
    constituents: Vec<String>,
    description: Option<String>,
    #[serde(default)]
    metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct ValidationSection {
    #[serde(default = "default_true")]
    enabled: bool,
    #[serde(default = "default_validation_path")]
    path: String,
    /// Probe this URL instead of the created remote's.
    url: Option<String>,
}

fn default_true() -> bool {
    true
}

fn default_validation_path() -> String {
    "/".to_string()
}

/// A rule built from a TOML template.
#[derive(Debug)]
pub struct TemplateRule {
    spec: TemplateSpec,
    expression: MatchExpression,
    placeholder: Regex,
}

impl TemplateRule {
    /// Parse a template. `name` is only used in error messages.
    pub fn parse(name: &str, text: &str) -> Result<Self> {
        let invalid = |detail: String| AutoProxError::InvalidRule {
            name: name.to_string(),
            detail,
        };

        let spec: TemplateSpec = toml::from_str(text).map_err(|e| invalid(e.to_string()))?;
        if spec.remote.is_none() && spec.hosted.is_none() && spec.group.is_none() {
            return Err(invalid("defines no [remote], [hosted] or [group] section".into()));
        }
        let expression = MatchExpression::parse(&spec.expression).map_err(|e| invalid(e.to_string()))?;
        let placeholder = Regex::new(r"\$\{([A-Za-z0-9_]+)\}").map_err(|e| invalid(e.to_string()))?;
        Ok(TemplateRule {
            spec,
            expression,
            placeholder,
        })
    }

    pub fn expression(&self) -> &MatchExpression {
        &self.expression
    }

    fn expand(&self, template: &str, key: &StoreKey) -> std::result::Result<String, RuleError> {
        let captures = self
            .expression
            .captures(key.name())
            .ok_or_else(|| RuleError::new(format!("'{}' does not match '{}'", key.name(), self.expression)))?;

        let mut out = String::with_capacity(template.len());
        let mut last = 0;
        for cap in self.placeholder.captures_iter(template) {
            let (Some(whole), Some(var)) = (cap.get(0), cap.get(1)) else {
                continue;
            };
            out.push_str(&template[last..whole.start()]);
            let value = match var.as_str() {
                "name" => key.name().to_string(),
                "package_type" => key.package_type().to_string(),
                n => n
                    .parse::<usize>()
                    .ok()
                    .and_then(|i| i.checked_sub(1))
                    .and_then(|i| captures.get(i))
                    .cloned()
                    .ok_or_else(|| RuleError::new(format!("unknown placeholder ${{{n}}}")))?,
            };
            out.push_str(&value);
            last = whole.end();
        }
        out.push_str(&template[last..]);
        Ok(out)
    }

    fn expand_metadata(
        &self,
        metadata: &BTreeMap<String, String>,
        key: &StoreKey,
    ) -> std::result::Result<BTreeMap<String, String>, RuleError> {
        metadata
            .iter()
            .map(|(k, v)| Ok((k.clone(), self.expand(v, key)?)))
            .collect()
    }

    fn expand_opt(&self, value: &Option<String>, key: &StoreKey) -> std::result::Result<Option<String>, RuleError> {
        value.as_deref().map(|v| self.expand(v, key)).transpose()
    }

    fn constituent(&self, template: &str, key: &StoreKey) -> std::result::Result<StoreKey, RuleError> {
        let expanded = self.expand(template, key)?;
        let parts: Vec<&str> = expanded.splitn(3, ':').collect();
        let member = match parts.as_slice() {
            [store_type, name] => {
                let store_type: StoreType = store_type
                    .parse()
                    .map_err(|e: depot_core::ModelError| RuleError::new(e.to_string()))?;
                StoreKey::new(key.package_type(), store_type, *name)
            }
            _ => StoreKey::parse(&expanded).map_err(|e| RuleError::new(e.to_string()))?,
        };
        Ok(member)
    }

    fn build_remote(
        &self,
        section: &RemoteSection,
        key: &StoreKey,
        url: &str,
    ) -> std::result::Result<RemoteRepository, RuleError> {
        let mut remote = RemoteRepository::new(key.package_type(), key.name(), self.expand(url, key)?);
        if let Some(timeout) = section.timeout_seconds {
            remote.timeout_seconds = timeout;
        }
        remote.cache_timeout_seconds = section.cache_timeout_seconds;
        remote.passthrough = section.passthrough;
        remote.user = self.expand_opt(&section.user, key)?;
        remote.password = self.expand_opt(&section.password, key)?;
        remote.settings.description = self.expand_opt(&section.description, key)?;
        remote.settings.metadata = self.expand_metadata(&section.metadata, key)?;
        Ok(remote)
    }
}

impl AutoProxRule for TemplateRule {
    fn matches(&self, key: &StoreKey) -> bool {
        self.spec.package_types.is_empty() || self.spec.package_types.iter().any(|p| p == key.package_type())
    }

    fn create_remote(&self, key: &StoreKey) -> RuleResult<RemoteRepository> {
        let Some(section) = &self.spec.remote else {
            return Ok(None);
        };
        self.build_remote(section, key, &section.url).map(Some)
    }

    fn create_hosted(&self, key: &StoreKey) -> RuleResult<HostedRepository> {
        let Some(section) = &self.spec.hosted else {
            return Ok(None);
        };
        let mut hosted = HostedRepository::new(key.package_type(), key.name());
        hosted.allow_releases = section.allow_releases;
        hosted.allow_snapshots = section.allow_snapshots;
        hosted.readonly = section.readonly;
        hosted.settings.authoritative_index = section.authoritative_index;
        hosted.settings.description = self.expand_opt(&section.description, key)?;
        hosted.settings.metadata = self.expand_metadata(&section.metadata, key)?;
        Ok(Some(hosted))
    }

    fn create_group(&self, key: &StoreKey) -> RuleResult<Group> {
        let Some(section) = &self.spec.group else {
            return Ok(None);
        };
        let mut group = Group::new(key.package_type(), key.name(), Vec::new());
        for template in &section.constituents {
            let member = self.constituent(template, key)?;
            group.add_constituent(member);
        }
        group.settings.description = self.expand_opt(&section.description, key)?;
        group.settings.metadata = self.expand_metadata(&section.metadata, key)?;
        Ok(Some(group))
    }

    fn is_validation_enabled(&self) -> bool {
        self.spec.validation.as_ref().is_some_and(|v| v.enabled)
    }

    fn validation_path(&self) -> Option<String> {
        self.spec.validation.as_ref().map(|v| v.path.clone())
    }

    fn create_validation_remote(&self, key: &StoreKey) -> RuleResult<RemoteRepository> {
        let url = self.spec.validation.as_ref().and_then(|v| v.url.as_deref());
        match (&self.spec.remote, url) {
            (Some(section), url) => self.build_remote(section, key, url.unwrap_or(&section.url)).map(Some),
            (None, Some(url)) => Ok(Some(RemoteRepository::new(
                key.package_type(),
                key.name(),
                self.expand(url, key)?,
            ))),
            (None, None) => Ok(None),
        }
    }
}

/// Reads `*.toml` rule files as [`TemplateRule`]s.
#[derive(Debug, Default, Clone, Copy)]
pub struct TomlRuleParser;

impl RuleParser for TomlRuleParser {
    fn extension(&self) -> &str {
        "toml"
    }

    fn parse(&self, name: &str, spec: &str) -> Result<RuleMapping> {
        let rule = TemplateRule::parse(name, spec)?;
        let expression = rule.expression().clone();
        Ok(RuleMapping::new(name, expression, Arc::new(rule)).with_spec(spec))
    }
}
