//! Merge candidates and federated results

use std::fmt;

use serde::{Deserialize, Serialize};

use super::entity::CompactedEntity;
use super::warning::NgsiLdWarning;

/// Where an entity fragment came from
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Origin {
    /// The local entity store
    Local,
    /// A remote context source, by registration id
    Remote(String),
}

impl Origin {
    /// Registration id for remote origins
    pub fn registration_id(&self) -> Option<&str> {
        match self {
            Origin::Local => None,
            Origin::Remote(id) => Some(id),
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::Local => f.write_str("local store"),
            Origin::Remote(id) => f.write_str(id),
        }
    }
}

/// An entity fragment paired with its origin
#[derive(Debug, Clone, PartialEq)]
pub struct MergeCandidate {
    pub entity: CompactedEntity,
    pub origin: Origin,
}

impl MergeCandidate {
    /// Candidate from the local store
    pub fn local(entity: CompactedEntity) -> Self {
        Self {
            entity,
            origin: Origin::Local,
        }
    }

    /// Candidate from a remote source
    pub fn remote(entity: CompactedEntity, registration_id: impl Into<String>) -> Self {
        Self {
            entity,
            origin: Origin::Remote(registration_id.into()),
        }
    }
}

/// Outcome of a federated query or retrieval
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FederatedResult {
    /// Merged entities, at most one per entity id
    pub entities: Vec<CompactedEntity>,
    /// Upper-bound estimate of the number of matching entities
    pub count: usize,
    /// Soft failures collected along the way
    pub warnings: Vec<NgsiLdWarning>,
}
