//! The rule capability interface.

use depot_core::{Group, HostedRepository, RemoteRepository, StoreKey};

/// A rule's own failure, before the catalog attributes it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct RuleError(pub String);

impl RuleError {
    pub fn new(detail: impl Into<String>) -> Self {
        RuleError(detail.into())
    }
}

/// `Ok(None)` means the rule does not produce this kind of store.
pub type RuleResult<T> = std::result::Result<Option<T>, RuleError>;

/// Creates stores for keys its mapping matched.
///
/// Every method has a conservative default so a rule only implements the
/// store kinds it knows how to build.
pub trait AutoProxRule: Send + Sync {
    /// Extra filtering beyond the mapping's match expression.
    fn matches(&self, _key: &StoreKey) -> bool {
        true
    }

    fn create_remote(&self, _key: &StoreKey) -> RuleResult<RemoteRepository> {
        Ok(None)
    }

    fn create_hosted(&self, _key: &StoreKey) -> RuleResult<HostedRepository> {
        Ok(None)
    }

    fn create_group(&self, _key: &StoreKey) -> RuleResult<Group> {
        Ok(None)
    }

    /// Whether synthesized remotes and groups must pass validation before they are kept.
    fn is_validation_enabled(&self) -> bool {
        false
    }

    /// Path probed on the validation remote. `None` means the root.
    fn validation_path(&self) -> Option<String> {
        None
    }

    /// The remote to probe; by default the one that would be created.
    fn create_validation_remote(&self, key: &StoreKey) -> RuleResult<RemoteRepository> {
        self.create_remote(key)
    }
}
