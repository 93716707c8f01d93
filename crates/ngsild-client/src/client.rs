//! NGSI-LD context source HTTP client

use std::time::Duration;

use ngsild_core::{
    CSRFilters, CompactedEntity, ContextSourceRegistration, EntitiesQuery, NgsiLdWarning,
    RequestContext,
};
use reqwest::header::{HeaderName, HeaderValue, ACCEPT};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::error::{ClientError, Result};

/// Response header carrying the total number of matching entities
pub const RESULTS_COUNT_HEADER: &str = "NGSILD-Results-Count";
/// Request header selecting the tenant
pub const TENANT_HEADER: &str = "NGSILD-Tenant";

const JSONLD_CONTEXT_REL: &str = "http://www.w3.org/ns/json-ld#context";
const ENTITIES_PATH: [&str; 3] = ["ngsi-ld", "v1", "entities"];

/// Headers the client sets itself; caller copies are not forwarded
const RESERVED_HEADERS: [&str; 7] = [
    "accept",
    "link",
    "ngsild-tenant",
    "host",
    "content-length",
    "connection",
    "transfer-encoding",
];

/// Default request timeout
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
/// Default connection timeout
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// One page of entities returned by a context source
#[derive(Debug, Clone, PartialEq)]
pub struct SourcePage {
    pub entities: Vec<CompactedEntity>,
    /// Total reported by the source, or the page length when it reports none
    pub count: usize,
}

/// NGSI-LD ProblemDetails body
#[derive(Deserialize)]
struct ProblemDetails {
    #[serde(default)]
    title: String,
    #[serde(default)]
    detail: String,
}

/// Client for remote NGSI-LD context sources.
///
/// Issues exactly one HTTP call per invocation and never retries. Every
/// failure is returned as an [`NgsiLdWarning`] attributed to the registration.
#[derive(Debug, Clone)]
pub struct ContextSourceClient {
    client: Client,
}

impl ContextSourceClient {
    /// Create a client with default timeouts
    pub fn new() -> Result<Self> {
        Self::with_config(DEFAULT_TIMEOUT, DEFAULT_CONNECT_TIMEOUT, None)
    }

    /// Create a client with custom timeouts and user agent
    pub fn with_config(
        timeout: Duration,
        connect_timeout: Duration,
        user_agent: Option<&str>,
    ) -> Result<Self> {
        let mut builder = Client::builder()
            .timeout(timeout)
            .connect_timeout(connect_timeout);
        if let Some(agent) = user_agent {
            builder = builder.user_agent(agent.to_string());
        }
        Ok(Self {
            client: builder.build()?,
        })
    }

    /// Wrap an existing HTTP client (shares its connection pool)
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    /// Query entities on a context source.
    ///
    /// The query is scoped to what the registration declares before it is
    /// forwarded, and `count=true` is always requested.
    #[instrument(skip_all, fields(registration_id = %registration.id))]
    pub async fn query(
        &self,
        context: &RequestContext,
        registration: &ContextSourceRegistration,
        filters: &CSRFilters,
        query: &EntitiesQuery,
    ) -> std::result::Result<SourcePage, NgsiLdWarning> {
        let scoped = scope_query(query, registration, filters);
        self.try_query(context, registration, &scoped)
            .await
            .map_err(|e| {
                warn!(endpoint = %registration.endpoint, error = %e, "Context source query failed");
                e.into_warning(&registration.id)
            })
    }

    /// Retrieve one entity from a context source. A 404 answer is `Ok(None)`.
    #[instrument(skip_all, fields(registration_id = %registration.id, entity_id = %entity_id))]
    pub async fn retrieve(
        &self,
        context: &RequestContext,
        registration: &ContextSourceRegistration,
        filters: &CSRFilters,
        entity_id: &str,
        query: &EntitiesQuery,
    ) -> std::result::Result<Option<CompactedEntity>, NgsiLdWarning> {
        let scoped = scope_query(query, registration, filters);
        self.try_retrieve(context, registration, entity_id, &scoped)
            .await
            .map_err(|e| {
                warn!(endpoint = %registration.endpoint, error = %e, "Context source retrieve failed");
                e.into_warning(&registration.id)
            })
    }

    async fn try_query(
        &self,
        context: &RequestContext,
        registration: &ContextSourceRegistration,
        query: &EntitiesQuery,
    ) -> Result<SourcePage> {
        let url = entities_url(&registration.endpoint, None)?;
        debug!(%url, "Querying context source");

        let response = self
            .request(url, context)
            .query(&query.to_query_pairs())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Self::extract_error(response, status).await);
        }

        let reported_count = response
            .headers()
            .get(RESULTS_COUNT_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<usize>().ok());

        let body = response.bytes().await?;
        let entities: Vec<CompactedEntity> = serde_json::from_slice(&body)
            .map_err(|e| ClientError::Malformed(format!("expected an entity list: {}", e)))?;

        let count = reported_count.unwrap_or(entities.len());
        debug!(entities = entities.len(), count, "Context source answered");
        Ok(SourcePage { entities, count })
    }

    async fn try_retrieve(
        &self,
        context: &RequestContext,
        registration: &ContextSourceRegistration,
        entity_id: &str,
        query: &EntitiesQuery,
    ) -> Result<Option<CompactedEntity>> {
        let url = entities_url(&registration.endpoint, Some(entity_id))?;
        debug!(%url, "Retrieving entity from context source");

        let response = self
            .request(url, context)
            .query(&retrieve_query_pairs(query))
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            debug!("Entity not held by context source");
            return Ok(None);
        }
        if !status.is_success() {
            return Err(Self::extract_error(response, status).await);
        }

        let body = response.bytes().await?;
        let entity: CompactedEntity = serde_json::from_slice(&body)
            .map_err(|e| ClientError::Malformed(format!("expected an entity: {}", e)))?;

        if entity.id() != entity_id {
            return Err(ClientError::Malformed(format!(
                "asked for {} but received {}",
                entity_id,
                entity.id()
            )));
        }
        Ok(Some(entity))
    }

    /// Start a GET request carrying tenant, JSON-LD context and forwarded headers
    fn request(&self, url: Url, context: &RequestContext) -> RequestBuilder {
        let mut request = self.client.get(url).header(ACCEPT, "application/json");

        if let Some(ref tenant) = context.tenant {
            request = request.header(TENANT_HEADER, tenant);
        }

        // NGSI-LD accepts a single context Link header on GET
        if let Some(jsonld_context) = context.contexts.first() {
            request = request.header(
                "Link",
                format!(
                    "<{}>; rel=\"{}\"; type=\"application/ld+json\"",
                    jsonld_context, JSONLD_CONTEXT_REL
                ),
            );
        }

        for (name, value) in &context.headers {
            if RESERVED_HEADERS.contains(&name.to_ascii_lowercase().as_str()) {
                continue;
            }
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => request = request.header(name, value),
                _ => warn!(header = %name, "Skipping header that cannot be forwarded"),
            }
        }

        request
    }

    async fn extract_error(response: reqwest::Response, status: StatusCode) -> ClientError {
        if matches!(
            status,
            StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT
        ) {
            return ClientError::Timeout;
        }

        let message = match response.json::<ProblemDetails>().await {
            Ok(problem) if !problem.detail.is_empty() => problem.detail,
            Ok(problem) if !problem.title.is_empty() => problem.title,
            _ => status
                .canonical_reason()
                .unwrap_or("unknown status")
                .to_string(),
        };

        ClientError::Status {
            status: status.as_u16(),
            message,
        }
    }
}

/// Build `{endpoint}/ngsi-ld/v1/entities[/{entity_id}]`, keeping any base path
/// of the endpoint and percent-encoding the entity id as one path segment.
fn entities_url(endpoint: &str, entity_id: Option<&str>) -> Result<Url> {
    let invalid = |reason: String| ClientError::InvalidEndpoint {
        endpoint: endpoint.to_string(),
        reason,
    };

    let mut url = Url::parse(endpoint).map_err(|e| invalid(e.to_string()))?;
    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|_| invalid("cannot be a base URL".to_string()))?;
        segments.pop_if_empty().extend(ENTITIES_PATH);
        if let Some(id) = entity_id {
            segments.push(id);
        }
    }
    Ok(url)
}

/// Restrict a query to the attributes the registration declares.
///
/// When the compatible information entries name their attributes, requested
/// attributes are intersected with them, or set to them when the caller asked
/// for all attributes. Registrations covering every attribute get the query
/// unchanged.
pub fn scope_query(
    query: &EntitiesQuery,
    registration: &ContextSourceRegistration,
    filters: &CSRFilters,
) -> EntitiesQuery {
    let mut scoped = query.clone();
    if let Some(declared) = filters.declared_attributes(registration) {
        scoped.attrs = if query.attrs.is_empty() {
            declared.into_iter().collect()
        } else {
            query
                .attrs
                .iter()
                .filter(|a| declared.contains(*a))
                .cloned()
                .collect()
        };
    }
    scoped
}

/// Query-string pairs for a single-entity retrieval
fn retrieve_query_pairs(query: &EntitiesQuery) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    if let Some(ref types) = query.type_selection {
        pairs.push(("type".to_string(), types.clone()));
    }
    if !query.attrs.is_empty() {
        pairs.push(("attrs".to_string(), query.attrs.join(",")));
    }
    if !query.options.is_empty() {
        pairs.push(("options".to_string(), query.options.join(",")));
    }
    pairs
}
