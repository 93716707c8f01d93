//! NGSI-LD Context Source Client
//!
//! Typed HTTP client for querying and retrieving entities from remote
//! NGSI-LD context sources registered with the broker.
//!
//! # Example
//!
//! ```rust,no_run
//! use ngsild_client::ContextSourceClient;
//! use ngsild_core::{CSRFilters, ContextSourceRegistration, EntitiesQuery, RequestContext};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let client = ContextSourceClient::new()?;
//! let csr = ContextSourceRegistration::new("urn:csr:a", "http://a:1026", "Beehive");
//! let query = EntitiesQuery::by_type("Beehive");
//! let filters = CSRFilters::for_query(&query)?;
//!
//! match client.query(&RequestContext::new(), &csr, &filters, &query).await {
//!     Ok(page) => println!("{} of {} entities", page.entities.len(), page.count),
//!     Err(warning) => eprintln!("{}", warning),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Testing
//!
//! The `testing` module provides a mock context source served over real HTTP:
//!
//! ```rust,ignore
//! use ngsild_client::testing::MockSource;
//!
//! let source = MockSource::with_entities(vec![json!({"id": "urn:1", "type": "Beehive"})]);
//! let server = source.start().await?;
//! let csr = ContextSourceRegistration::new("urn:csr:a", server.base_url(), "Beehive");
//! ```

mod client;
mod error;
pub mod testing;

pub use client::{scope_query, ContextSourceClient, SourcePage, RESULTS_COUNT_HEADER, TENANT_HEADER};
pub use error::{ClientError, Result};
