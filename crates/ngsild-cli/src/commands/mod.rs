//! Command implementations for ngsild-federate

pub mod query;
pub mod retrieve;
pub mod sources;

pub use query::query;
pub use retrieve::retrieve;
pub use sources::sources;
