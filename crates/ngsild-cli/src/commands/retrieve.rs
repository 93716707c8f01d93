//! Retrieve command - federated single-entity retrieval

use anyhow::Result;
use ngsild_federation::{CancelToken, EntitiesQuery, FederationService, RequestContext};

use crate::output::OutputContext;

/// Retrieve one entity, merged from every source holding a fragment of it
pub async fn retrieve(
    service: &FederationService,
    request: &RequestContext,
    entity_id: &str,
    query: &EntitiesQuery,
    cancel: &CancelToken,
    ctx: &OutputContext,
) -> Result<()> {
    let result = service
        .federate_retrieve(request, entity_id, query, cancel)
        .await?;
    for entity in &result.entities {
        ctx.print_entity(entity);
    }
    ctx.warnings(&result.warnings);
    Ok(())
}
