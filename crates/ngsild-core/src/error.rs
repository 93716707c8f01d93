//! Hard errors raised by the federation engine

use thiserror::Error;

/// Result type for federation operations
pub type FederationResult<T> = Result<T, FederationError>;

/// Base URI of the NGSI-LD ProblemDetails error types
const PROBLEM_TYPE_BASE: &str = "https://uri.etsi.org/ngsi-ld/errors/";

/// Errors that abort a federated request.
///
/// Per-source failures are never represented here; they are folded into
/// [`NgsiLdWarning`](crate::NgsiLdWarning)s instead.
#[derive(Debug, Error)]
pub enum FederationError {
    /// Entity is absent from the local store and from every remote source
    #[error("Entity not found: {0}")]
    EntityNotFound(String),

    /// Incoming query or filter is malformed
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Registration catalogue lookup failed
    #[error("Registration catalogue error: {0}")]
    Catalogue(String),

    /// Local entity store failed
    #[error("Local store error: {0}")]
    LocalStore(String),

    /// Caller cancelled the request before it completed
    #[error("Request cancelled")]
    Cancelled,

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl FederationError {
    /// Returns the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            FederationError::EntityNotFound(_) => 404,
            FederationError::InvalidRequest(_) => 400,
            FederationError::Catalogue(_) => 500,
            FederationError::LocalStore(_) => 500,
            // Client closed request
            FederationError::Cancelled => 499,
            FederationError::Internal(_) => 500,
        }
    }

    /// Returns the NGSI-LD ProblemDetails `type` URI for this error
    pub fn problem_type(&self) -> String {
        let name = match self {
            FederationError::EntityNotFound(_) => "ResourceNotFound",
            FederationError::InvalidRequest(_) => "BadRequestData",
            FederationError::Catalogue(_)
            | FederationError::LocalStore(_)
            | FederationError::Cancelled
            | FederationError::Internal(_) => "InternalError",
        };
        format!("{}{}", PROBLEM_TYPE_BASE, name)
    }
}
