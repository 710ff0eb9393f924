//! AutoProx: on-demand store provisioning for the depot repository manager.
//!
//! When a lookup names a store that does not exist, the first matching rule
//! in the catalog may synthesize it. Remote stores can be validated against
//! their upstream before they are kept; groups keep only the members that
//! resolve. Anything a rule fails to produce is simply absent.
//!
//! # Architecture
//!
//! - [`AutoProxRule`]: what a rule can create
//! - [`RuleMapping`]: a rule plus the match expression that selects it
//! - [`AutoProxCatalog`]: ordered rule set, loaded by an injected [`RuleParser`]
//! - [`AutoProxResolver`]: the registry decorator that provisions on a miss
//! - [`AutoProxCalculator`]: dry-run of what a rule would create

pub mod calc;
pub mod catalog;
pub mod config;
pub mod error;
pub mod mapping;
pub mod provision;
pub mod rule;
pub mod template;
pub mod validate;

// Re-exports for convenience.
pub use calc::{AutoProxCalculator, ProvisionPlan};
pub use catalog::{AutoProxCatalog, RuleParser};
pub use config::AutoProxConfig;
pub use error::{AutoProxError, Result};
pub use mapping::{MatchExpression, RuleMapping};
pub use provision::AutoProxResolver;
pub use rule::{AutoProxRule, RuleError, RuleResult};
pub use template::{TemplateRule, TomlRuleParser};
pub use validate::{HttpRemoteValidator, RemoteValidator};

/// Metadata key naming what created a store.
pub const METADATA_ORIGIN: &str = "origin";
/// Value of [`METADATA_ORIGIN`] for provisioned stores.
pub const AUTOPROX_ORIGIN: &str = "autoprox";
/// Metadata key naming the group whose provisioning implied this store.
pub const METADATA_IMPLIED_BY: &str = "implied_by";
