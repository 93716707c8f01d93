//! Collaborator traits consumed by the federation engine
//!
//! The engine does not own entity persistence, the registration catalogue or
//! linked entity resolution. These traits are the seams where the hosting
//! broker plugs its own implementations in.

use async_trait::async_trait;

use crate::error::FederationResult;
use crate::models::{CSRFilters, CompactedEntity, ContextSourceRegistration, EntitiesQuery, RequestContext};

/// Local entity store
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// Query local entities. Returns one page of entities and the total count
    /// of matching entities before pagination.
    async fn query_entities(
        &self,
        context: &RequestContext,
        query: &EntitiesQuery,
    ) -> FederationResult<(Vec<CompactedEntity>, usize)>;

    /// Retrieve one local entity, `Ok(None)` when it does not exist locally.
    ///
    /// Local absence is not an error: remote sources may still hold the entity.
    async fn query_entity(
        &self,
        context: &RequestContext,
        entity_id: &str,
        query: &EntitiesQuery,
    ) -> FederationResult<Option<CompactedEntity>>;
}

/// Persisted set of context source registrations
#[async_trait]
pub trait RegistrationCatalogue: Send + Sync {
    /// Registrations matching `filters`, in a stable order.
    ///
    /// Implementations may pre-filter coarsely; the matcher re-applies the
    /// exact [`CSRFilters::matches`] predicate.
    async fn find_matching(
        &self,
        context: &RequestContext,
        filters: &CSRFilters,
    ) -> FederationResult<Vec<ContextSourceRegistration>>;
}

/// Expands `@id`-linked sub-entities after merge
#[async_trait]
pub trait LinkedEntityProcessor: Send + Sync {
    async fn resolve(
        &self,
        context: &RequestContext,
        entities: Vec<CompactedEntity>,
        query: &EntitiesQuery,
    ) -> FederationResult<Vec<CompactedEntity>>;
}

/// Linked entity processor that returns entities unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughLinkedEntities;

#[async_trait]
impl LinkedEntityProcessor for PassthroughLinkedEntities {
    async fn resolve(
        &self,
        _context: &RequestContext,
        entities: Vec<CompactedEntity>,
        _query: &EntitiesQuery,
    ) -> FederationResult<Vec<CompactedEntity>> {
        Ok(entities)
    }
}
