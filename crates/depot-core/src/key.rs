//! Store identity.
//!
//! A [`StoreKey`] renders as `packageType:storeType:name`, e.g.
//! `maven:remote:central`. The legacy two-part form `storeType:name` is still
//! accepted when parsing and defaults the package type to [`MAVEN`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};

/// Package type for Maven repositories.
pub const MAVEN: &str = "maven";
/// Package type for NPM registries.
pub const NPM: &str = "npm";
/// Package type for plain HTTP content.
pub const GENERIC_HTTP: &str = "generic-http";

/// The three kinds of artifact store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreType {
    /// Proxy of an upstream URL.
    Remote,
    /// Locally deployed content.
    Hosted,
    /// Ordered aggregation of other stores.
    Group,
}

impl StoreType {
    /// All store types, in declaration order.
    pub const ALL: [StoreType; 3] = [StoreType::Remote, StoreType::Hosted, StoreType::Group];

    /// Canonical lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreType::Remote => "remote",
            StoreType::Hosted => "hosted",
            StoreType::Group => "group",
        }
    }

    /// Concrete stores hold content themselves; groups only point at them.
    pub fn is_concrete(&self) -> bool {
        !matches!(self, StoreType::Group)
    }
}

impl fmt::Display for StoreType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StoreType {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "remote" | "repository" => Ok(StoreType::Remote),
            "hosted" | "deploy_point" => Ok(StoreType::Hosted),
            "group" => Ok(StoreType::Group),
            _ => Err(ModelError::InvalidStoreType {
                value: s.to_string(),
            }),
        }
    }
}

/// Unique identity of an artifact store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StoreKey {
    package_type: String,
    store_type: StoreType,
    name: String,
}

impl StoreKey {
    /// Build a key from its parts.
    pub fn new(
        package_type: impl Into<String>,
        store_type: StoreType,
        name: impl Into<String>,
    ) -> Self {
        StoreKey {
            package_type: package_type.into(),
            store_type,
            name: name.into(),
        }
    }

    pub fn remote(package_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(package_type, StoreType::Remote, name)
    }

    pub fn hosted(package_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(package_type, StoreType::Hosted, name)
    }

    pub fn group(package_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(package_type, StoreType::Group, name)
    }

    /// Parse `packageType:storeType:name` (or legacy `storeType:name`).
    pub fn parse(input: &str) -> Result<Self> {
        let invalid = |detail: &str| ModelError::InvalidKey {
            input: input.to_string(),
            detail: detail.to_string(),
        };

        let parts: Vec<&str> = input.trim().splitn(3, ':').collect();
        let key = match parts.as_slice() {
            [store_type, name] => StoreKey::new(MAVEN, store_type.parse()?, *name),
            [package_type, store_type, name] => match store_type.parse() {
                Ok(st) => StoreKey::new(*package_type, st, *name),
                // `remote:name:with:colons` is a legacy key whose name has colons.
                Err(e) => match package_type.parse() {
                    Ok(st) => StoreKey::new(MAVEN, st, format!("{store_type}:{name}")),
                    Err(_) => return Err(e),
                },
            },
            _ => return Err(invalid("expected packageType:storeType:name")),
        };

        if key.package_type.is_empty() {
            return Err(invalid("empty package type"));
        }
        if key.name.is_empty() {
            return Err(invalid("empty store name"));
        }
        Ok(key)
    }

    pub fn package_type(&self) -> &str {
        &self.package_type
    }

    pub fn store_type(&self) -> StoreType {
        self.store_type
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// True for remote and hosted keys.
    pub fn is_concrete(&self) -> bool {
        self.store_type.is_concrete()
    }

    /// Same package type and name, different store type.
    pub fn with_type(&self, store_type: StoreType) -> Self {
        StoreKey::new(self.package_type.clone(), store_type, self.name.clone())
    }
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.package_type, self.store_type, self.name)
    }
}

impl FromStr for StoreKey {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self> {
        StoreKey::parse(s)
    }
}

impl TryFrom<String> for StoreKey {
    type Error = ModelError;

    fn try_from(value: String) -> Result<Self> {
        StoreKey::parse(&value)
    }
}

impl From<StoreKey> for String {
    fn from(key: StoreKey) -> String {
        key.to_string()
    }
}
