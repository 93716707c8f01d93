//! Federation configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tunables for the fan-out to remote context sources
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FederationConfig {
    /// Maximum remote calls in flight per request (unbounded if not set)
    pub max_concurrent_sources: Option<usize>,

    /// Per-call timeout in milliseconds
    pub source_timeout_ms: u64,

    /// TCP connect timeout in milliseconds
    pub connect_timeout_ms: u64,

    /// User-Agent sent to remote sources
    pub user_agent: Option<String>,
}

impl Default for FederationConfig {
    fn default() -> Self {
        Self {
            max_concurrent_sources: None,
            source_timeout_ms: 10_000,
            connect_timeout_ms: 5_000,
            user_agent: Some(concat!("ngsild-federation/", env!("CARGO_PKG_VERSION")).to_string()),
        }
    }
}

impl FederationConfig {
    pub fn source_timeout(&self) -> Duration {
        Duration::from_millis(self.source_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}
