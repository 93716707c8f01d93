//! Sources command - show which context sources a query would reach

use anyhow::Result;
use ngsild_federation::{CancelToken, EntitiesQuery, FederationService, RequestContext};

use crate::output::OutputContext;

/// List matching registrations. With `probe`, run the query once first so
/// the listed health reflects a real call to each source.
pub async fn sources(
    service: &FederationService,
    request: &RequestContext,
    query: &EntitiesQuery,
    probe: bool,
    cancel: &CancelToken,
    ctx: &OutputContext,
) -> Result<()> {
    if probe {
        let result = service.federate_query(request, query, cancel).await?;
        ctx.warnings(&result.warnings);
    }
    let sources = service.sources_for(request, query).await?;
    ctx.print_sources(&sources);
    Ok(())
}
