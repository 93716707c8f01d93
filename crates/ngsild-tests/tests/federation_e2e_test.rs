//! End-to-end tests for federated entity queries
//!
//! Each test starts mock context sources on ephemeral ports, registers them
//! in an in-memory catalogue and runs queries through the FederationService.
//!
//! Run with: cargo test -p ngsild-tests --test federation_e2e_test

use std::sync::Arc;
use std::time::{Duration, Instant};

use ngsild_client::testing::{MockSource, StatusCode, TestServer};
use ngsild_core::{
    CompactedEntity, ContextSourceRegistration, InMemoryCatalogue, InMemoryLocalStore,
    RegistrationInfo, RegistrationMode, WarningCode,
};
use ngsild_federation::{
    CancelToken, EntitiesQuery, FederationConfig, FederationError, FederationService,
    RequestContext,
};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tokio::time::sleep;

/// Endpoint nobody listens on
const DEAD_ENDPOINT: &str = "http://127.0.0.1:1";

struct Harness {
    catalogue: Arc<InMemoryCatalogue>,
    service: FederationService,
    // Keep mock sources alive for the duration of the test
    _servers: Vec<TestServer>,
}

impl Harness {
    async fn new(
        local: Vec<CompactedEntity>,
        sources: Vec<(ContextSourceRegistration, Option<MockSource>)>,
    ) -> Self {
        Self::with_config(FederationConfig::default(), local, sources).await
    }

    /// Registrations whose mock is `Some` get their endpoint pointed at the
    /// started mock; the others keep the endpoint they were given.
    async fn with_config(
        config: FederationConfig,
        local: Vec<CompactedEntity>,
        sources: Vec<(ContextSourceRegistration, Option<MockSource>)>,
    ) -> Self {
        let mut servers = Vec::new();
        let mut registrations = Vec::new();
        for (mut registration, mock) in sources {
            if let Some(mock) = mock {
                let server = mock.start().await.expect("mock source starts");
                registration.endpoint = server.base_url();
                servers.push(server);
            }
            registrations.push(registration);
        }

        let catalogue = Arc::new(InMemoryCatalogue::with_registrations(registrations));
        let service = FederationService::new(
            &config,
            Arc::new(InMemoryLocalStore::with_entities(local)),
            catalogue.clone(),
        )
        .expect("service builds");

        Self {
            catalogue,
            service,
            _servers: servers,
        }
    }

    async fn query(&self, query: EntitiesQuery) -> ngsild_federation::FederatedResult {
        self.service
            .federate_query(&RequestContext::new(), &query, &CancelToken::new())
            .await
            .expect("federated query succeeds")
    }
}

fn csr(id: &str) -> ContextSourceRegistration {
    ContextSourceRegistration::new(id, DEAD_ENDPOINT, "Beehive")
}

fn entity(value: Value) -> CompactedEntity {
    CompactedEntity::from_value(value).unwrap()
}

fn ids(entities: &[CompactedEntity]) -> Vec<&str> {
    entities.iter().map(|e| e.id()).collect()
}

// =============================================================================
// Merge behaviour
// =============================================================================

#[tokio::test]
async fn beehive_fragments_merge_into_one_entity() {
    let a = MockSource::with_entities(vec![json!({"id": "urn:1", "type": "Beehive", "name": "A"})]);
    let b = MockSource::with_entities(vec![json!({"id": "urn:1", "type": "Beehive", "temp": 30})]);
    let harness = Harness::new(
        Vec::new(),
        vec![(csr("urn:csr:a"), Some(a)), (csr("urn:csr:b"), Some(b))],
    )
    .await;

    let result = harness.query(EntitiesQuery::by_type("Beehive")).await;

    assert_eq!(result.entities.len(), 1);
    assert_eq!(
        serde_json::to_value(&result.entities[0]).unwrap(),
        json!({"id": "urn:1", "type": "Beehive", "name": "A", "temp": 30})
    );
    assert_eq!(result.count, 1);
    assert!(result.warnings.is_empty());
}

#[tokio::test]
async fn local_store_takes_precedence_over_sources() {
    let remote = MockSource::with_entities(vec![json!({"id": "urn:1", "type": "Beehive", "name": "remote", "temp": 30})]);
    let harness = Harness::new(
        vec![entity(json!({"id": "urn:1", "type": "Beehive", "name": "local"}))],
        vec![(csr("urn:csr:a"), Some(remote))],
    )
    .await;

    let result = harness.query(EntitiesQuery::by_type("Beehive")).await;

    assert_eq!(result.entities[0].get("name"), Some(&json!("local")));
    assert_eq!(result.entities[0].get("temp"), Some(&json!(30)));
    assert_eq!(result.warnings.len(), 1);
    assert_eq!(result.warnings[0].code, WarningCode::AttributeConflict);
    assert_eq!(result.warnings[0].registration_id.as_deref(), Some("urn:csr:a"));
}

#[tokio::test]
async fn auxiliary_sources_rank_last() {
    let aux = MockSource::with_entities(vec![json!({"id": "urn:1", "type": "Beehive", "name": "fallback"})]);
    let main = MockSource::with_entities(vec![json!({"id": "urn:1", "type": "Beehive", "name": "primary"})]);
    let harness = Harness::new(
        Vec::new(),
        vec![
            (csr("urn:csr:aux").with_mode(RegistrationMode::Auxiliary), Some(aux)),
            (csr("urn:csr:main"), Some(main)),
        ],
    )
    .await;

    let result = harness.query(EntitiesQuery::by_type("Beehive")).await;
    assert_eq!(result.entities[0].get("name"), Some(&json!("primary")));
    assert_eq!(result.warnings[0].registration_id.as_deref(), Some("urn:csr:aux"));
}

#[tokio::test]
async fn count_is_the_largest_reported_never_the_sum() {
    let local: Vec<CompactedEntity> = (1..=5)
        .map(|i| CompactedEntity::new(format!("urn:local:{}", i), "Beehive"))
        .collect();
    let a = MockSource::with_entities(vec![json!({"id": "urn:a:1", "type": "Beehive"})]).with_count(3);
    let b = MockSource::with_entities(vec![json!({"id": "urn:b:1", "type": "Beehive"})]).with_count(9);
    let harness = Harness::new(
        local,
        vec![(csr("urn:csr:a"), Some(a)), (csr("urn:csr:b"), Some(b))],
    )
    .await;

    let result = harness.query(EntitiesQuery::by_type("Beehive")).await;
    assert_eq!(result.count, 9);
    assert_eq!(result.entities.len(), 7);
}

#[tokio::test]
async fn limit_truncates_merged_list_local_first() {
    let remote = MockSource::with_entities(vec![
        json!({"id": "urn:r:1", "type": "Beehive"}),
        json!({"id": "urn:r:2", "type": "Beehive"}),
        json!({"id": "urn:r:3", "type": "Beehive"}),
    ]);
    let harness = Harness::new(
        vec![
            CompactedEntity::new("urn:l:1", "Beehive"),
            CompactedEntity::new("urn:l:2", "Beehive"),
        ],
        vec![(csr("urn:csr:a"), Some(remote.clone()))],
    )
    .await;

    let result = harness.query(EntitiesQuery::by_type("Beehive").with_limit(3)).await;
    assert_eq!(ids(&result.entities), vec!["urn:l:1", "urn:l:2", "urn:r:1"]);
    assert_eq!(result.count, 3);
    assert_eq!(remote.requests()[0].params.get("limit").map(String::as_str), Some("3"));
}

// =============================================================================
// Failure isolation
// =============================================================================

#[tokio::test]
async fn failing_sources_become_warnings() {
    let healthy = MockSource::with_entities(vec![json!({"id": "urn:1", "type": "Beehive", "name": "A"})]);
    let broken = MockSource::failing(StatusCode::SERVICE_UNAVAILABLE);
    let garbled = MockSource::with_raw_body("<html>gateway</html>");
    let harness = Harness::new(
        vec![entity(json!({"id": "urn:2", "type": "Beehive"}))],
        vec![
            (csr("urn:csr:broken"), Some(broken)),
            (csr("urn:csr:healthy"), Some(healthy)),
            (csr("urn:csr:dead"), None),
            (csr("urn:csr:garbled"), Some(garbled)),
        ],
    )
    .await;

    let result = harness.query(EntitiesQuery::by_type("Beehive")).await;

    assert_eq!(ids(&result.entities), vec!["urn:2", "urn:1"]);
    let warnings: Vec<(Option<&str>, WarningCode)> = result
        .warnings
        .iter()
        .map(|w| (w.registration_id.as_deref(), w.code))
        .collect();
    assert_eq!(
        warnings,
        vec![
            (Some("urn:csr:broken"), WarningCode::ErrorResponse),
            (Some("urn:csr:dead"), WarningCode::Unreachable),
            (Some("urn:csr:garbled"), WarningCode::MalformedResponse),
        ]
    );
    assert!(result.warnings[0].message.contains("mock source failure"));
}

#[tokio::test]
async fn slow_source_times_out_without_holding_up_the_rest() {
    let slow = MockSource::with_entities(vec![json!({"id": "urn:slow", "type": "Beehive"})])
        .with_delay(Duration::from_secs(3));
    let fast = MockSource::with_entities(vec![json!({"id": "urn:fast", "type": "Beehive"})]);
    let config = FederationConfig {
        source_timeout_ms: 200,
        ..Default::default()
    };
    let harness = Harness::with_config(
        config,
        Vec::new(),
        vec![(csr("urn:csr:slow"), Some(slow)), (csr("urn:csr:fast"), Some(fast))],
    )
    .await;

    let started = Instant::now();
    let result = harness.query(EntitiesQuery::by_type("Beehive")).await;

    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(ids(&result.entities), vec!["urn:fast"]);
    assert_eq!(result.warnings.len(), 1);
    assert_eq!(result.warnings[0].code, WarningCode::Timeout);
    assert_eq!(result.warnings[0].registration_id.as_deref(), Some("urn:csr:slow"));
}

#[tokio::test]
async fn catalogue_failure_aborts_the_query() {
    let harness = Harness::new(Vec::new(), vec![(csr("urn:csr:a"), None)]).await;
    harness.catalogue.set_available(false);

    let err = harness
        .service
        .federate_query(&RequestContext::new(), &EntitiesQuery::default(), &CancelToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, FederationError::Catalogue(_)));
}

// =============================================================================
// Selection and request shaping
// =============================================================================

#[tokio::test]
async fn only_matching_sources_are_called() {
    let hives = MockSource::with_entities(Vec::new());
    let apiaries = MockSource::with_entities(Vec::new());
    let harness = Harness::new(
        Vec::new(),
        vec![
            (csr("urn:csr:hives"), Some(hives.clone())),
            (
                ContextSourceRegistration::new("urn:csr:apiaries", DEAD_ENDPOINT, "Apiary"),
                Some(apiaries.clone()),
            ),
        ],
    )
    .await;

    harness.query(EntitiesQuery::by_type("Beehive")).await;
    harness.query(EntitiesQuery::by_type("Beehive")).await;

    assert_eq!(hives.hits(), 2);
    assert_eq!(apiaries.hits(), 0);
}

#[tokio::test]
async fn request_is_scoped_and_carries_tenant_and_headers() {
    let source = MockSource::with_entities(Vec::new());
    let registration = csr("urn:csr:a").with_information(vec![RegistrationInfo {
        property_names: Some(vec!["temperature".into()]),
        ..RegistrationInfo::for_type("Beehive")
    }]);
    let harness = Harness::new(Vec::new(), vec![(registration, Some(source.clone()))]).await;

    let context = RequestContext::new()
        .with_tenant("garden")
        .with_context("https://example.org/bees.jsonld")
        .with_header("Authorization", "Bearer token-1");
    let query = EntitiesQuery::by_type("Beehive").with_attrs(["name", "temperature"]);
    harness
        .service
        .federate_query(&context, &query, &CancelToken::new())
        .await
        .unwrap();

    let requests = source.requests();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request.params.get("type").map(String::as_str), Some("Beehive"));
    assert_eq!(request.params.get("attrs").map(String::as_str), Some("temperature"));
    assert_eq!(request.params.get("count").map(String::as_str), Some("true"));
    assert_eq!(request.tenant.as_deref(), Some("garden"));
    assert_eq!(
        request.headers.get("authorization").map(String::as_str),
        Some("Bearer token-1")
    );
    assert!(request
        .headers
        .get("link")
        .is_some_and(|link| link.contains("<https://example.org/bees.jsonld>")));
}

// =============================================================================
// Concurrency, cancellation and health
// =============================================================================

#[tokio::test]
async fn concurrency_limit_serializes_calls() {
    let delay = Duration::from_millis(150);
    let sources: Vec<MockSource> = (0..3)
        .map(|_| MockSource::with_entities(Vec::new()).with_delay(delay))
        .collect();
    let config = FederationConfig {
        max_concurrent_sources: Some(1),
        ..Default::default()
    };
    let harness = Harness::with_config(
        config,
        Vec::new(),
        sources
            .iter()
            .enumerate()
            .map(|(i, s)| (csr(&format!("urn:csr:{}", i)), Some(s.clone())))
            .collect(),
    )
    .await;

    let started = Instant::now();
    let result = harness.query(EntitiesQuery::by_type("Beehive")).await;

    assert!(result.warnings.is_empty());
    assert!(started.elapsed() >= delay * 3);
    assert!(sources.iter().all(|s| s.hits() == 1));
}

#[tokio::test]
async fn cancelling_stops_in_flight_calls_without_health_updates() {
    let slow = MockSource::with_entities(Vec::new()).with_delay(Duration::from_secs(5));
    let harness = Harness::new(Vec::new(), vec![(csr("urn:csr:slow"), Some(slow.clone()))]).await;

    let cancel = CancelToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let err = harness
        .service
        .federate_query(&RequestContext::new(), &EntitiesQuery::by_type("Beehive"), &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, FederationError::Cancelled));
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(slow.hits(), 1);
    assert!(harness.service.health().snapshot().is_empty());
}

#[tokio::test]
async fn health_records_success_then_failure() {
    let up = MockSource::with_entities(Vec::new());
    let down = MockSource::failing(StatusCode::INTERNAL_SERVER_ERROR);
    let up_server = up.start().await.unwrap();
    let down_server = down.start().await.unwrap();

    let registration = csr("urn:csr:flaky");
    let harness = Harness::new(
        Vec::new(),
        vec![(
            ContextSourceRegistration {
                endpoint: up_server.base_url(),
                ..registration.clone()
            },
            None,
        )],
    )
    .await;

    harness.query(EntitiesQuery::by_type("Beehive")).await;
    let after_success = harness.service.health().status("urn:csr:flaky");
    assert!(after_success.last_success_at.is_some());
    assert!(after_success.is_healthy());

    sleep(Duration::from_millis(10)).await;
    harness.catalogue.register(ContextSourceRegistration {
        endpoint: down_server.base_url(),
        ..registration
    });
    let result = harness.query(EntitiesQuery::by_type("Beehive")).await;
    assert_eq!(result.warnings.len(), 1);

    let status = harness.service.health().status("urn:csr:flaky");
    assert!(status.last_failure_at > status.last_success_at);
    assert!(!status.is_healthy());

    let sources = harness
        .service
        .sources_for(&RequestContext::new(), &EntitiesQuery::by_type("Beehive"))
        .await
        .unwrap();
    assert_eq!(sources[0].status, status);
}
