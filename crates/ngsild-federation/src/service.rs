//! Federation Service - query and retrieve across the local store and
//! registered context sources

use std::sync::Arc;

use ngsild_client::ContextSourceClient;
use ngsild_core::{
    CSRFilters, ContextSourceRegistration, EntitiesQuery, FederatedResult, FederationError,
    FederationResult, LinkedEntityProcessor, LocalStore, MergeCandidate,
    PassthroughLinkedEntities, RegistrationCatalogue, RequestContext,
};
use tracing::{debug, info, instrument};

use crate::cancel::CancelToken;
use crate::config::FederationConfig;
use crate::fanout::FanOut;
use crate::health::HealthTracker;
use crate::matcher::{RegistrationMatcher, SelectionPolicy};
use crate::merge::{merge_entities, merge_entities_lists, reconcile_count};

/// Entry point of the federation engine.
///
/// Each request selects the eligible registrations, fans out to the local
/// store and those sources, merges what comes back and resolves linked
/// entities on the merged result. Per-source failures become warnings on the
/// result; only catalogue, local store, not-found and malformed-request
/// failures abort a request.
pub struct FederationService {
    local: Arc<dyn LocalStore>,
    matcher: RegistrationMatcher,
    linked: Arc<dyn LinkedEntityProcessor>,
    client: ContextSourceClient,
    health: Arc<HealthTracker>,
    fan_out: FanOut,
}

impl FederationService {
    /// Create a service with its own health tracker and HTTP client
    pub fn new(
        config: &FederationConfig,
        local: Arc<dyn LocalStore>,
        catalogue: Arc<dyn RegistrationCatalogue>,
    ) -> FederationResult<Self> {
        let client = ContextSourceClient::with_config(
            config.source_timeout(),
            config.connect_timeout(),
            config.user_agent.as_deref(),
        )
        .map_err(|e| FederationError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        let health = Arc::new(HealthTracker::new());
        info!(
            max_concurrent_sources = ?config.max_concurrent_sources,
            source_timeout_ms = config.source_timeout_ms,
            "Federation service ready"
        );

        Ok(Self {
            local,
            matcher: RegistrationMatcher::new(catalogue, health.clone()),
            linked: Arc::new(PassthroughLinkedEntities),
            client,
            fan_out: FanOut::new(
                config.max_concurrent_sources,
                config.source_timeout(),
                health.clone(),
            ),
            health,
        })
    }

    /// Resolve linked entities with `processor` after merge
    pub fn with_linked_entities(mut self, processor: Arc<dyn LinkedEntityProcessor>) -> Self {
        self.linked = processor;
        self
    }

    /// Replace the source selection policy
    pub fn with_selection_policy(mut self, policy: Arc<dyn SelectionPolicy>) -> Self {
        self.matcher = self.matcher.with_policy(policy);
        self
    }

    /// Health of every source called so far
    pub fn health(&self) -> &Arc<HealthTracker> {
        &self.health
    }

    /// Registrations a query would be sent to, without calling them
    pub async fn sources_for(
        &self,
        context: &RequestContext,
        query: &EntitiesQuery,
    ) -> FederationResult<Vec<ContextSourceRegistration>> {
        let filters = CSRFilters::for_query(query)?;
        self.matcher.select(context, &filters).await
    }

    /// Query entities across the local store and every matching source.
    ///
    /// The count is the largest count reported by any participant. With a
    /// `limit`, the merged list is cut to `limit` entities.
    #[instrument(skip_all, fields(tenant = ?context.tenant))]
    pub async fn federate_query(
        &self,
        context: &RequestContext,
        query: &EntitiesQuery,
        cancel: &CancelToken,
    ) -> FederationResult<FederatedResult> {
        let filters = CSRFilters::for_query(query)?;
        let registrations = self.matcher.select(context, &filters).await?;
        info!(sources = registrations.len(), "Federating entity query");

        let client = &self.client;
        let filters = &filters;
        let outcome = self
            .fan_out
            .run(
                self.local.query_entities(context, query),
                registrations,
                move |registration| async move {
                    client.query(context, &registration, filters, query).await
                },
                cancel,
            )
            .await?;

        let (local_entities, local_count) = outcome.local;
        let mut warnings = Vec::new();
        let mut candidates = Vec::new();
        let mut remote_counts = Vec::new();
        for (result, registration) in outcome.remote {
            match result {
                Ok(page) => {
                    remote_counts.push(page.count);
                    candidates.extend(
                        page.entities
                            .into_iter()
                            .map(|e| MergeCandidate::remote(e, registration.id.clone())),
                    );
                }
                Err(warning) => warnings.push(warning),
            }
        }

        let (mut entities, conflicts) = merge_entities_lists(local_entities, candidates);
        warnings.extend(conflicts);
        if let Some(limit) = query.limit {
            entities.truncate(limit);
        }

        let entities = self.linked.resolve(context, entities, query).await?;
        let count = reconcile_count(local_count, remote_counts);
        debug!(
            entities = entities.len(),
            count,
            warnings = warnings.len(),
            "Federated query complete"
        );

        Ok(FederatedResult {
            entities,
            count,
            warnings,
        })
    }

    /// Retrieve one entity from the local store and every matching source.
    ///
    /// Fails with [`FederationError::EntityNotFound`] when nobody holds it.
    #[instrument(skip_all, fields(tenant = ?context.tenant, entity_id = %entity_id))]
    pub async fn federate_retrieve(
        &self,
        context: &RequestContext,
        entity_id: &str,
        query: &EntitiesQuery,
        cancel: &CancelToken,
    ) -> FederationResult<FederatedResult> {
        let filters = CSRFilters::for_retrieve(entity_id, query)?;
        let registrations = self.matcher.select(context, &filters).await?;
        info!(sources = registrations.len(), "Federating entity retrieval");

        let client = &self.client;
        let filters = &filters;
        let outcome = self
            .fan_out
            .run(
                self.local.query_entity(context, entity_id, query),
                registrations,
                move |registration| async move {
                    client
                        .retrieve(context, &registration, filters, entity_id, query)
                        .await
                },
                cancel,
            )
            .await?;

        let mut warnings = Vec::new();
        let mut candidates = Vec::new();
        for (result, registration) in outcome.remote {
            match result {
                Ok(Some(entity)) => candidates.push(MergeCandidate::remote(entity, registration.id)),
                Ok(None) => debug!(registration_id = %registration.id, "Source does not hold the entity"),
                Err(warning) => warnings.push(warning),
            }
        }

        let (entity, conflicts) = merge_entities(entity_id, outcome.local, candidates)?;
        warnings.extend(conflicts);

        let entities = self.linked.resolve(context, vec![entity], query).await?;
        Ok(FederatedResult {
            count: entities.len(),
            entities,
            warnings,
        })
    }
}
