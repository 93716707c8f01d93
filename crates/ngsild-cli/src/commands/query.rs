//! Query command - federated entity query

use anyhow::Result;
use ngsild_federation::{CancelToken, EntitiesQuery, FederationService, RequestContext};

use crate::output::OutputContext;

/// Query entities across the local store and every matching source
pub async fn query(
    service: &FederationService,
    request: &RequestContext,
    query: &EntitiesQuery,
    cancel: &CancelToken,
    ctx: &OutputContext,
) -> Result<()> {
    let result = service.federate_query(request, query, cancel).await?;
    ctx.print_result(&result);
    Ok(())
}
