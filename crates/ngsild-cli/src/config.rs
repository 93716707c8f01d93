//! Configuration file handling for ngsild-federate
//!
//! ```toml
//! [federation]
//! max_concurrent_sources = 8
//! source_timeout_ms = 3000
//!
//! [local]
//! entities = "local-entities.json"
//!
//! [[registration]]
//! id = "urn:ngsi-ld:ContextSourceRegistration:hives"
//! endpoint = "http://hives.example.org:1026"
//! information = [{ entities = [{ type = "Beehive" }] }]
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use ngsild_core::{CompactedEntity, ContextSourceRegistration};
use ngsild_federation::FederationConfig;
use serde::Deserialize;

/// Configuration for the CLI tool
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Fan-out tunables
    pub federation: FederationConfig,
    /// Local entity store seed
    pub local: LocalConfig,
    /// Registration catalogue seed, in precedence order
    pub registration: Vec<ContextSourceRegistration>,
}

/// Where local entities come from
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LocalConfig {
    /// JSON file holding an array of compacted entities, relative to the
    /// config file
    pub entities: Option<PathBuf>,
}

impl Config {
    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        if let (Some(entities), Some(dir)) = (config.local.entities.as_mut(), path.parent()) {
            if entities.is_relative() {
                *entities = dir.join(&*entities);
            }
        }
        Ok(config)
    }

    /// Apply command-line overrides over file values
    pub fn with_overrides(mut self, max_concurrent_sources: Option<usize>, source_timeout_ms: Option<u64>) -> Self {
        if max_concurrent_sources.is_some() {
            self.federation.max_concurrent_sources = max_concurrent_sources;
        }
        if let Some(timeout) = source_timeout_ms {
            self.federation.source_timeout_ms = timeout;
        }
        self
    }

    /// Read the local entities file, if one is configured
    pub fn local_entities(&self) -> Result<Vec<CompactedEntity>> {
        let Some(ref path) = self.local.entities else {
            return Ok(Vec::new());
        };
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read local entities: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse local entities: {}", path.display()))
    }
}
