//! Shared data models for NGSI-LD federation

mod entity;
mod filters;
mod query;
mod registration;
mod result;
mod type_selection;
mod warning;

pub use entity::*;
pub use filters::*;
pub use query::*;
pub use registration::*;
pub use result::*;
pub use type_selection::*;
pub use warning::*;
