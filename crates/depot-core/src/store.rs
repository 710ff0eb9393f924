//! Artifact store definitions.
//!
//! The three store kinds share a [`StoreSettings`] block (key, enablement,
//! metadata, index flags) and add their own fields on top. [`ArtifactStore`]
//! is the tagged union the registry persists and hands out.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};
use crate::key::{StoreKey, StoreType};

/// Settings shared by every store kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreSettings {
    /// Unique identity.
    pub key: StoreKey,
    /// Free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Whether the store is disabled.
    #[serde(default)]
    pub disabled: bool,
    /// When a disabled store re-enables itself. `None` means never.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled_until: Option<DateTime<Utc>>,
    /// Arbitrary string metadata (e.g. `origin = "autoprox"`).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
    /// Treat the content index as complete for this store.
    #[serde(default)]
    pub authoritative_index: bool,
    /// Stamped by the registry on every successful write.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
}

impl StoreSettings {
    /// Enabled settings with no metadata.
    pub fn new(key: StoreKey) -> Self {
        StoreSettings {
            key,
            description: None,
            disabled: false,
            disabled_until: None,
            metadata: BTreeMap::new(),
            authoritative_index: false,
            last_modified: None,
        }
    }

    /// Whether the store counts as disabled at `now`.
    pub fn is_disabled_at(&self, now: DateTime<Utc>) -> bool {
        self.disabled && self.disabled_until.map_or(true, |until| now < until)
    }
}

/// A proxy of an upstream repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteRepository {
    #[serde(flatten)]
    pub settings: StoreSettings,
    /// Upstream base URL.
    pub url: String,
    /// Request timeout against the upstream.
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u32,
    /// How long proxied content stays fresh. Zero means the server default.
    #[serde(default)]
    pub cache_timeout_seconds: u32,
    /// Never cache, always pass requests through.
    #[serde(default)]
    pub passthrough: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

fn default_timeout_seconds() -> u32 {
    60
}

impl RemoteRepository {
    pub fn new(package_type: impl Into<String>, name: impl Into<String>, url: impl Into<String>) -> Self {
        RemoteRepository {
            settings: StoreSettings::new(StoreKey::remote(package_type, name)),
            url: url.into(),
            timeout_seconds: default_timeout_seconds(),
            cache_timeout_seconds: 0,
            passthrough: false,
            user: None,
            password: None,
        }
    }

    /// Parse the upstream URL.
    pub fn parsed_url(&self) -> Result<url::Url> {
        url::Url::parse(&self.url).map_err(|e| ModelError::InvalidUrl {
            key: self.settings.key.to_string(),
            url: self.url.clone(),
            detail: e.to_string(),
        })
    }
}

/// A store holding locally deployed content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostedRepository {
    #[serde(flatten)]
    pub settings: StoreSettings,
    #[serde(default = "default_true")]
    pub allow_releases: bool,
    #[serde(default)]
    pub allow_snapshots: bool,
    /// Readonly stores reject deletion and imply an authoritative index.
    #[serde(default)]
    pub readonly: bool,
}

fn default_true() -> bool {
    true
}

impl HostedRepository {
    pub fn new(package_type: impl Into<String>, name: impl Into<String>) -> Self {
        HostedRepository {
            settings: StoreSettings::new(StoreKey::hosted(package_type, name)),
            allow_releases: true,
            allow_snapshots: false,
            readonly: false,
        }
    }
}

/// An ordered aggregation of other stores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    #[serde(flatten)]
    pub settings: StoreSettings,
    /// Members, searched in order.
    #[serde(default)]
    pub constituents: Vec<StoreKey>,
    /// New members go to the front instead of the back.
    #[serde(default)]
    pub prepend_constituent: bool,
}

impl Group {
    pub fn new(
        package_type: impl Into<String>,
        name: impl Into<String>,
        constituents: Vec<StoreKey>,
    ) -> Self {
        Group {
            settings: StoreSettings::new(StoreKey::group(package_type, name)),
            constituents,
            prepend_constituent: false,
        }
    }

    /// Add a member. Returns false for duplicates and self-references.
    pub fn add_constituent(&mut self, key: StoreKey) -> bool {
        if key == self.settings.key || self.constituents.contains(&key) {
            return false;
        }
        if self.prepend_constituent {
            self.constituents.insert(0, key);
        } else {
            self.constituents.push(key);
        }
        true
    }

    /// Remove a member. Returns whether it was present.
    pub fn remove_constituent(&mut self, key: &StoreKey) -> bool {
        let before = self.constituents.len();
        self.constituents.retain(|k| k != key);
        self.constituents.len() != before
    }
}

/// Any artifact store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ArtifactStore {
    Remote(RemoteRepository),
    Hosted(HostedRepository),
    Group(Group),
}

impl ArtifactStore {
    pub fn settings(&self) -> &StoreSettings {
        match self {
            ArtifactStore::Remote(r) => &r.settings,
            ArtifactStore::Hosted(h) => &h.settings,
            ArtifactStore::Group(g) => &g.settings,
        }
    }

    pub fn settings_mut(&mut self) -> &mut StoreSettings {
        match self {
            ArtifactStore::Remote(r) => &mut r.settings,
            ArtifactStore::Hosted(h) => &mut h.settings,
            ArtifactStore::Group(g) => &mut g.settings,
        }
    }

    pub fn key(&self) -> &StoreKey {
        &self.settings().key
    }

    /// The kind of store, from the variant (not the key).
    pub fn store_type(&self) -> StoreType {
        match self {
            ArtifactStore::Remote(_) => StoreType::Remote,
            ArtifactStore::Hosted(_) => StoreType::Hosted,
            ArtifactStore::Group(_) => StoreType::Group,
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.settings().is_disabled_at(Utc::now())
    }

    pub fn is_enabled(&self) -> bool {
        !self.is_disabled()
    }

    /// Disable the store, optionally until a point in time.
    pub fn disable(&mut self, until: Option<DateTime<Utc>>) {
        let settings = self.settings_mut();
        settings.disabled = true;
        settings.disabled_until = until;
    }

    pub fn enable(&mut self) {
        let settings = self.settings_mut();
        settings.disabled = false;
        settings.disabled_until = None;
    }

    pub fn is_readonly(&self) -> bool {
        matches!(self, ArtifactStore::Hosted(h) if h.readonly)
    }

    /// Effective authoritative-index flag: explicit, or implied by a readonly hosted store.
    pub fn authoritative_index(&self) -> bool {
        self.settings().authoritative_index || self.is_readonly()
    }

    pub fn last_modified(&self) -> Option<DateTime<Utc>> {
        self.settings().last_modified
    }

    pub fn metadata(&self, name: &str) -> Option<&str> {
        self.settings().metadata.get(name).map(String::as_str)
    }

    pub fn set_metadata(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.settings_mut().metadata.insert(name.into(), value.into());
    }

    /// Group members, or `None` for concrete stores.
    pub fn constituents(&self) -> Option<&[StoreKey]> {
        match self {
            ArtifactStore::Group(g) => Some(&g.constituents),
            _ => None,
        }
    }

    pub fn as_remote(&self) -> Option<&RemoteRepository> {
        match self {
            ArtifactStore::Remote(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_hosted(&self) -> Option<&HostedRepository> {
        match self {
            ArtifactStore::Hosted(h) => Some(h),
            _ => None,
        }
    }

    pub fn as_group(&self) -> Option<&Group> {
        match self {
            ArtifactStore::Group(g) => Some(g),
            _ => None,
        }
    }

    /// Check the definition is internally consistent.
    ///
    /// Cross-store checks (dangling members, cycles) belong to the registry.
    pub fn validate(&self) -> Result<()> {
        let key = self.key();
        if key.store_type() != self.store_type() {
            return Err(ModelError::TypeMismatch {
                key: key.to_string(),
                declared: self.store_type().to_string(),
                actual: key.store_type().to_string(),
            });
        }

        match self {
            ArtifactStore::Remote(remote) => {
                remote.parsed_url()?;
            }
            ArtifactStore::Hosted(_) => {}
            ArtifactStore::Group(group) => {
                let mut seen = std::collections::HashSet::new();
                for member in &group.constituents {
                    if member == key {
                        return Err(ModelError::SelfReference {
                            key: key.to_string(),
                        });
                    }
                    if !seen.insert(member) {
                        return Err(ModelError::DuplicateConstituent {
                            key: key.to_string(),
                            member: member.to_string(),
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

impl From<RemoteRepository> for ArtifactStore {
    fn from(remote: RemoteRepository) -> Self {
        ArtifactStore::Remote(remote)
    }
}

impl From<HostedRepository> for ArtifactStore {
    fn from(hosted: HostedRepository) -> Self {
        ArtifactStore::Hosted(hosted)
    }
}

impl From<Group> for ArtifactStore {
    fn from(group: Group) -> Self {
        ArtifactStore::Group(group)
    }
}
