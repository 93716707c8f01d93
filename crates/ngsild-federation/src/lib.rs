//! ngsild-federation - Context source fan-out and entity merge
//!
//! This crate answers NGSI-LD entity queries and retrievals by combining the
//! local entity store with every registered context source that can
//! contribute, tolerating per-source failures as warnings.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                       FederationService                          │
//! │                                                                  │
//! │  RegistrationMatcher ──► FanOut ──► merge ──► LinkedEntityProcessor
//! │         │                  │                                     │
//! │         ▼                  ├──► LocalStore                       │
//! │  RegistrationCatalogue     ├──► ContextSourceClient (source A)   │
//! │                            ├──► ContextSourceClient (source B)   │
//! │                            └──► HealthTracker (per call)         │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use ngsild_federation::{CancelToken, FederationConfig, FederationService};
//!
//! let service = FederationService::new(&FederationConfig::default(), local, catalogue)?;
//! let result = service
//!     .federate_query(&RequestContext::new(), &EntitiesQuery::by_type("Beehive"), &CancelToken::new())
//!     .await?;
//! for warning in &result.warnings {
//!     eprintln!("{}", warning);
//! }
//! ```

mod cancel;
mod config;
mod fanout;
mod health;
mod matcher;
mod merge;
mod service;

pub use cancel::CancelToken;
pub use config::FederationConfig;
pub use fanout::{FanOut, FanOutResult, RemoteOutcome};
pub use health::HealthTracker;
pub use matcher::{AcceptAll, RegistrationMatcher, SelectionPolicy};
pub use merge::{merge_entities, merge_entities_lists, reconcile_count};
pub use service::FederationService;

// Re-export core types for convenience
pub use ngsild_core::{
    EntitiesQuery, FederatedResult, FederationError, FederationResult, NgsiLdWarning,
    RequestContext,
};
