//! Error taxonomy for the client core
//!
//! Three failure classes cross the gateway boundary:
//! - Network: the transport failed and no response was received
//! - Status: the service answered with a non-2xx status
//! - Decode: the service answered but the body was not valid JSON
//!
//! Absent cached data is NOT an error - it is a pending state handled by the
//! resource cache. Nothing here is retried or swallowed; errors propagate to
//! the caller (the view), which decides what the user sees.

use std::fmt;

/// Error produced by a gateway request.
///
/// Cloneable so a single in-flight fetch can deliver its failure to every
/// de-duplicated waiter of the same cache key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// Transport failure - connection refused, DNS, timeout. No response.
    Network(String),
    /// Non-2xx response. Carries the status and the raw response body so the
    /// caller can show the service's own error detail.
    Status { status: u16, body: String },
    /// The response body could not be parsed as JSON.
    Decode(String),
}

impl ApiError {
    /// HTTP status code, if the service produced a response.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// True for authorization failures (401/403).
    ///
    /// The session is never cleared on these - logout stays an explicit user
    /// action. Views may still want to render them differently.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self.status(), Some(401) | Some(403))
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Network(msg) => write!(f, "network error: {}", msg),
            ApiError::Status { status, body } => {
                if body.is_empty() {
                    write!(f, "api error: status {}", status)
                } else {
                    write!(f, "api error: status {}: {}", status, body)
                }
            }
            ApiError::Decode(msg) => write!(f, "invalid response body: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_accessor() {
        let err = ApiError::Status {
            status: 404,
            body: String::new(),
        };
        assert_eq!(err.status(), Some(404));
        assert_eq!(ApiError::Network("refused".into()).status(), None);
    }

    #[test]
    fn test_unauthorized_detection() {
        let unauthorized = ApiError::Status {
            status: 401,
            body: "{\"detail\":\"invalid token\"}".into(),
        };
        assert!(unauthorized.is_unauthorized());

        let not_found = ApiError::Status {
            status: 404,
            body: String::new(),
        };
        assert!(!not_found.is_unauthorized());
        assert!(!ApiError::Decode("eof".into()).is_unauthorized());
    }

    #[test]
    fn test_display_includes_body() {
        let err = ApiError::Status {
            status: 422,
            body: "duplicate entity".into(),
        };
        let rendered = err.to_string();
        assert!(rendered.contains("422"));
        assert!(rendered.contains("duplicate entity"));
    }
}
