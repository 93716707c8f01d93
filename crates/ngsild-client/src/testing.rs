//! Test utilities for ngsild-client
//!
//! Provides a throwaway HTTP server and a scriptable mock NGSI-LD context
//! source for exercising federation over real HTTP.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::net::TcpListener;

use crate::client::{RESULTS_COUNT_HEADER, TENANT_HEADER};

/// Status codes for [`MockSource::failing`]
pub use axum::http::StatusCode;

/// A test server that automatically shuts down when dropped
pub struct TestServer {
    pub addr: SocketAddr,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl TestServer {
    /// Serve an axum Router on an ephemeral local port
    pub async fn start(router: Router) -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

        let handle = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .ok();
        });

        Ok(Self {
            addr,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    /// Get the base URL of the test server
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Shutdown the server gracefully
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

/// A request observed by a [`MockSource`]
#[derive(Debug, Clone, Default)]
pub struct RecordedRequest {
    /// Entity id for retrievals, `None` for queries
    pub entity_id: Option<String>,
    pub params: HashMap<String, String>,
    pub tenant: Option<String>,
    pub headers: HashMap<String, String>,
}

#[derive(Clone)]
enum Behaviour {
    Entities { entities: Vec<Value>, count: Option<usize> },
    Status(StatusCode),
    RawBody(String),
}

/// Scriptable mock NGSI-LD context source.
///
/// Serves `GET /ngsi-ld/v1/entities` and `GET /ngsi-ld/v1/entities/{id}`
/// from a fixed entity list (the source does its own filtering in real life;
/// the mock returns what it was given) and records every request.
#[derive(Clone)]
pub struct MockSource {
    behaviour: Behaviour,
    delay: Duration,
    hits: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockSource {
    /// Source answering with `entities` and no count header
    pub fn with_entities(entities: Vec<Value>) -> Self {
        Self {
            behaviour: Behaviour::Entities {
                entities,
                count: None,
            },
            delay: Duration::ZERO,
            hits: Arc::new(AtomicUsize::new(0)),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Source answering every request with an error status and ProblemDetails body
    pub fn failing(status: StatusCode) -> Self {
        Self {
            behaviour: Behaviour::Status(status),
            ..Self::with_entities(Vec::new())
        }
    }

    /// Source answering every request with 200 and a verbatim body
    pub fn with_raw_body(body: impl Into<String>) -> Self {
        Self {
            behaviour: Behaviour::RawBody(body.into()),
            ..Self::with_entities(Vec::new())
        }
    }

    /// Report `count` in the results count header
    pub fn with_count(mut self, count: usize) -> Self {
        if let Behaviour::Entities { count: ref mut c, .. } = self.behaviour {
            *c = Some(count);
        }
        self
    }

    /// Wait before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Number of requests served (or started) so far
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    /// Requests observed so far
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }

    /// Router serving this source
    pub fn router(&self) -> Router {
        Router::new()
            .route("/ngsi-ld/v1/entities", get(query_entities))
            .route("/ngsi-ld/v1/entities/{id}", get(retrieve_entity))
            .with_state(self.clone())
    }

    /// Start serving on an ephemeral port
    pub async fn start(&self) -> std::io::Result<TestServer> {
        TestServer::start(self.router()).await
    }

    async fn record(&self, entity_id: Option<String>, params: HashMap<String, String>, headers: &HeaderMap) {
        self.hits.fetch_add(1, Ordering::SeqCst);
        let headers: HashMap<String, String> = headers
            .iter()
            .filter_map(|(k, v)| Some((k.as_str().to_string(), v.to_str().ok()?.to_string())))
            .collect();
        self.requests.lock().push(RecordedRequest {
            entity_id,
            params,
            tenant: headers.get(&TENANT_HEADER.to_ascii_lowercase()).cloned(),
            headers,
        });
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }
}

fn problem(status: StatusCode, detail: &str) -> Response {
    (
        status,
        Json(json!({
            "type": "https://uri.etsi.org/ngsi-ld/errors/InternalError",
            "title": status.canonical_reason().unwrap_or("error"),
            "detail": detail,
        })),
    )
        .into_response()
}

async fn query_entities(
    State(source): State<MockSource>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    source.record(None, params, &headers).await;
    match source.behaviour {
        Behaviour::Entities { entities, count } => {
            let mut response = Json(entities).into_response();
            if let Some(count) = count {
                if let Ok(value) = count.to_string().parse() {
                    response.headers_mut().insert(RESULTS_COUNT_HEADER, value);
                }
            }
            response
        }
        Behaviour::Status(status) => problem(status, "mock source failure"),
        Behaviour::RawBody(body) => (StatusCode::OK, body).into_response(),
    }
}

async fn retrieve_entity(
    State(source): State<MockSource>,
    Path(id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    source.record(Some(id.clone()), params, &headers).await;
    match source.behaviour {
        Behaviour::Entities { entities, .. } => {
            match entities.into_iter().find(|e| e.get("id").and_then(Value::as_str) == Some(id.as_str())) {
                Some(entity) => Json(entity).into_response(),
                None => problem(StatusCode::NOT_FOUND, &format!("{} not found", id)),
            }
        }
        Behaviour::Status(status) => problem(status, "mock source failure"),
        Behaviour::RawBody(body) => (StatusCode::OK, body).into_response(),
    }
}
