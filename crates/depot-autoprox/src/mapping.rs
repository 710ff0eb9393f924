//! Match expressions and rule mappings.
//!
//! A match expression selects store names:
//! - `default`: matches everything, always tried last
//! - `prefix*`: names starting with `prefix`
//! - `/regex/`: names the whole regex matches
//! - anything else: that exact name

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use depot_core::StoreKey;
use regex::Regex;

use crate::rule::AutoProxRule;

#[derive(Debug, Clone)]
pub enum MatchExpression {
    Default,
    Prefix(String),
    Exact(String),
    Pattern(Regex),
}

impl MatchExpression {
    pub fn parse(expr: &str) -> Result<Self, regex::Error> {
        let expr = expr.trim();
        if expr == "default" {
            Ok(MatchExpression::Default)
        } else if expr.len() > 1 && expr.starts_with('/') && expr.ends_with('/') {
            let pattern = &expr[1..expr.len() - 1];
            Ok(MatchExpression::Pattern(Regex::new(&format!("^(?:{pattern})$"))?))
        } else if let Some(prefix) = expr.strip_suffix('*') {
            Ok(MatchExpression::Prefix(prefix.to_string()))
        } else {
            Ok(MatchExpression::Exact(expr.to_string()))
        }
    }

    pub fn is_default(&self) -> bool {
        matches!(self, MatchExpression::Default)
    }

    pub fn matches(&self, name: &str) -> bool {
        self.captures(name).is_some()
    }

    /// Values for `${1}`, `${2}`, ... when `name` matches.
    ///
    /// A prefix match captures the remainder after the prefix; a regex match
    /// captures its groups; `default` captures the whole name.
    pub fn captures(&self, name: &str) -> Option<Vec<String>> {
        match self {
            MatchExpression::Default => Some(vec![name.to_string()]),
            MatchExpression::Prefix(prefix) => name.strip_prefix(prefix.as_str()).map(|rest| vec![rest.to_string()]),
            MatchExpression::Exact(exact) => (name == exact).then(Vec::new),
            MatchExpression::Pattern(regex) => regex.captures(name).map(|caps| {
                caps.iter()
                    .skip(1)
                    .map(|m| m.map_or(String::new(), |m| m.as_str().to_string()))
                    .collect()
            }),
        }
    }
}

impl fmt::Display for MatchExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchExpression::Default => f.write_str("default"),
            MatchExpression::Prefix(prefix) => write!(f, "{prefix}*"),
            MatchExpression::Exact(exact) => f.write_str(exact),
            MatchExpression::Pattern(regex) => {
                let source = regex.as_str();
                let inner = source
                    .strip_prefix("^(?:")
                    .and_then(|s| s.strip_suffix(")$"))
                    .unwrap_or(source);
                write!(f, "/{inner}/")
            }
        }
    }
}

/// A named rule and the expression that selects it.
#[derive(Clone)]
pub struct RuleMapping {
    name: String,
    expression: MatchExpression,
    rule: Arc<dyn AutoProxRule>,
    spec: Option<String>,
}

impl RuleMapping {
    pub fn new(name: impl Into<String>, expression: MatchExpression, rule: Arc<dyn AutoProxRule>) -> Self {
        RuleMapping {
            name: name.into(),
            expression,
            rule,
            spec: None,
        }
    }

    /// Keep the source text the rule was parsed from.
    pub fn with_spec(mut self, spec: impl Into<String>) -> Self {
        self.spec = Some(spec.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn expression(&self) -> &MatchExpression {
        &self.expression
    }

    pub fn rule(&self) -> &dyn AutoProxRule {
        self.rule.as_ref()
    }

    pub fn spec(&self) -> Option<&str> {
        self.spec.as_deref()
    }

    pub fn matches(&self, key: &StoreKey) -> bool {
        self.expression.matches(key.name()) && self.rule.matches(key)
    }

    /// Catalog order: specific rules by name, then `default` rules.
    pub fn precedence(&self, other: &RuleMapping) -> Ordering {
        self.expression
            .is_default()
            .cmp(&other.expression.is_default())
            .then_with(|| self.name.cmp(&other.name))
    }
}

impl fmt::Debug for RuleMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleMapping")
            .field("name", &self.name)
            .field("expression", &self.expression.to_string())
            .finish()
    }
}
