//! Error types for context source calls

use ngsild_core::{NgsiLdWarning, WarningCode};
use thiserror::Error;

/// Result type alias for context source calls
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors that can occur while calling a context source.
///
/// These never leave the client: [`ContextSourceClient`](crate::ContextSourceClient)
/// converts them into [`NgsiLdWarning`]s at its boundary.
#[derive(Error, Debug)]
pub enum ClientError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Registration endpoint is not a usable base URL
    #[error("Invalid endpoint '{endpoint}': {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    /// Source returned a non-success status
    #[error("Source returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    /// Body is not a compacted entity or entity list
    #[error("Malformed response: {0}")]
    Malformed(String),

    /// Source did not answer in time
    #[error("Request timed out")]
    Timeout,
}

impl ClientError {
    /// Warning code this failure is reported under
    pub fn warning_code(&self) -> WarningCode {
        match self {
            ClientError::Http(e) if e.is_timeout() => WarningCode::Timeout,
            ClientError::Http(e) if e.is_decode() => WarningCode::MalformedResponse,
            ClientError::Http(_) => WarningCode::Unreachable,
            ClientError::InvalidEndpoint { .. } => WarningCode::Unreachable,
            ClientError::Status { .. } => WarningCode::ErrorResponse,
            ClientError::Malformed(_) => WarningCode::MalformedResponse,
            ClientError::Timeout => WarningCode::Timeout,
        }
    }

    /// Convert into a warning attributed to `registration_id`
    pub fn into_warning(self, registration_id: &str) -> NgsiLdWarning {
        NgsiLdWarning::for_source(registration_id, self.warning_code(), self.to_string())
    }
}
