//! ngsild-core - Core types and collaborator traits for NGSI-LD federation
//!
//! This crate provides the data model shared by the federation engine
//! (entities, context source registrations, filters, warnings) together with
//! the traits of the collaborators the engine consumes but does not own:
//! the local entity store, the registration catalogue and the linked entity
//! processor.

pub mod collaborators;
pub mod error;
pub mod memory;
pub mod models;

pub use collaborators::{LinkedEntityProcessor, LocalStore, PassthroughLinkedEntities, RegistrationCatalogue};
pub use error::{FederationError, FederationResult};
pub use memory::{InMemoryCatalogue, InMemoryLocalStore};
pub use models::*;
