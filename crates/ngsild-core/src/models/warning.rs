//! Non-fatal federation warnings

use std::fmt;

use serde::{Deserialize, Serialize};

/// Kind of soft failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WarningCode {
    /// Source could not be reached (connection refused, DNS, TLS, ...)
    Unreachable,
    /// Source did not answer within its timeout
    Timeout,
    /// Source answered with a non-success status
    ErrorResponse,
    /// Source answered with a body that is not a compacted entity (list)
    MalformedResponse,
    /// Two sources disagree on the value of an attribute
    AttributeConflict,
}

impl WarningCode {
    /// Kebab-case name of this code
    pub fn as_str(&self) -> &'static str {
        match self {
            WarningCode::Unreachable => "unreachable",
            WarningCode::Timeout => "timeout",
            WarningCode::ErrorResponse => "error-response",
            WarningCode::MalformedResponse => "malformed-response",
            WarningCode::AttributeConflict => "attribute-conflict",
        }
    }

    /// RFC 7234 warn-code used when rendering a `Warning` header
    pub fn http_warn_code(&self) -> u16 {
        match self {
            // Revalidation failed
            WarningCode::Unreachable | WarningCode::Timeout => 111,
            WarningCode::ErrorResponse => 299,
            WarningCode::MalformedResponse | WarningCode::AttributeConflict => 199,
        }
    }
}

impl fmt::Display for WarningCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A structured, non-fatal failure returned alongside federated results
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NgsiLdWarning {
    /// Source that produced the warning; `None` for the local store
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registration_id: Option<String>,
    /// Kind of failure
    pub code: WarningCode,
    /// Human-readable detail
    pub message: String,
}

impl NgsiLdWarning {
    /// Warning attributed to a remote source
    pub fn for_source(registration_id: impl Into<String>, code: WarningCode, message: impl Into<String>) -> Self {
        Self {
            registration_id: Some(registration_id.into()),
            code,
            message: message.into(),
        }
    }

    /// Render as an RFC 7234 `Warning` header value:
    /// `<warn-code> <agent> "<text>"`
    ///
    /// ```
    /// # use ngsild_core::{NgsiLdWarning, WarningCode};
    /// let w = NgsiLdWarning::for_source("urn:csr:a", WarningCode::Timeout, "no answer in 5s");
    /// assert_eq!(w.to_header_value(), r#"111 urn:csr:a "no answer in 5s""#);
    /// ```
    pub fn to_header_value(&self) -> String {
        let agent = self.registration_id.as_deref().unwrap_or("-");
        let text = self.message.replace('\\', "\\\\").replace('"', "\\\"");
        format!("{} {} \"{}\"", self.code.http_warn_code(), agent, text)
    }
}

impl fmt::Display for NgsiLdWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.registration_id {
            Some(ref id) => write!(f, "[{}] {}: {}", self.code, id, self.message),
            None => write!(f, "[{}] {}", self.code, self.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_kebab_case_code() {
        let w = NgsiLdWarning::for_source("urn:csr:a", WarningCode::MalformedResponse, "not JSON");
        let json = serde_json::to_value(&w).unwrap();
        assert_eq!(json["code"], "malformed-response");
        assert_eq!(json["registrationId"], "urn:csr:a");
    }

    #[test]
    fn header_value_escapes_quotes() {
        let w = NgsiLdWarning {
            registration_id: None,
            code: WarningCode::AttributeConflict,
            message: r#"attribute "name" differs"#.to_string(),
        };
        assert_eq!(w.to_header_value(), r#"199 - "attribute \"name\" differs""#);
    }

    #[test]
    fn display_names_the_source() {
        let w = NgsiLdWarning::for_source("urn:csr:b", WarningCode::ErrorResponse, "HTTP 500");
        assert_eq!(w.to_string(), "[error-response] urn:csr:b: HTTP 500");
    }
}
