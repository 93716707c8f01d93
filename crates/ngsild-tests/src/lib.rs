//! End-to-end tests for NGSI-LD federation
//!
//! The tests in `tests/` run the federation service against mock context
//! sources served over real HTTP on ephemeral local ports, so no external
//! setup is needed:
//!
//! ```bash
//! cargo test -p ngsild-tests
//! ```
//!
//! # Test Structure
//!
//! - `federation_e2e_test.rs` - Query fan-out, merge, failure isolation and health
//! - `retrieve_e2e_test.rs` - Single-entity retrieval across sources

// This crate only contains tests, no library code
