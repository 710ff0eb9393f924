//! AutoProx configuration (the `[autoprox]` section of `depot.toml`).

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoProxConfig {
    pub enabled: bool,
    /// Directory of `*.toml` rule specs.
    pub rules_dir: Option<PathBuf>,
    /// Upper bound on one upstream validation request.
    pub validation_timeout_ms: u64,
}

impl AutoProxConfig {
    pub fn validation_timeout(&self) -> Duration {
        Duration::from_millis(self.validation_timeout_ms)
    }
}

impl Default for AutoProxConfig {
    fn default() -> Self {
        AutoProxConfig {
            enabled: true,
            rules_dir: None,
            validation_timeout_ms: 5_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_section() {
        let config: AutoProxConfig = toml::from_str(
            r#"
rules_dir = "autoprox"
validation_timeout_ms = 250
"#,
        )
        .unwrap();
        assert!(config.enabled);
        assert_eq!(config.rules_dir, Some(PathBuf::from("autoprox")));
        assert_eq!(config.validation_timeout(), Duration::from_millis(250));
    }
}
