//! Registry configuration (the `[registry]` section of `depot.toml`).

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tunables for the store registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// How long a mutation waits for the per-key lock.
    pub lock_timeout_ms: u64,
    /// Worker threads delivering pooled change events.
    pub event_workers: usize,
    /// Bounded queue depth in front of the event workers.
    pub event_queue: usize,
    /// Reject group definitions that would close a membership cycle.
    pub reject_cycles: bool,
}

impl RegistryConfig {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        RegistryConfig {
            lock_timeout_ms: 30_000,
            event_workers: 4,
            event_queue: 256,
            reject_cycles: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_section_keeps_defaults() {
        let config: RegistryConfig = toml::from_str("event_workers = 8").unwrap();
        assert_eq!(config.event_workers, 8);
        assert_eq!(config.lock_timeout(), Duration::from_secs(30));
        assert!(config.reject_cycles);
    }
}
