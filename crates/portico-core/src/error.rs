//! Gateway error taxonomy.
//!
//! Defines [`GatewayError`], the domain error enum shared by the backends
//! and the HTTP layer. Backend adapters translate their service-specific
//! "not found" signals (an empty search result, a 404 status) into
//! [`GatewayError::NotFound`] at the adapter boundary; every other backend
//! failure surfaces as [`GatewayError::Upstream`] without retry. The HTTP
//! layer maps each variant onto a status code via
//! [`GatewayError::status_code`].

/// Gateway error type.
///
/// Each variant corresponds to one class of failure the gateway can report
/// to a caller. The response body for errors is a short plain-text message
/// (`NoSuchKey`, `Access denied to this bucket`, the upstream error text);
/// the HTTP layer owns that formatting.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The addressed bucket is not on the configured allow-list.
    #[error("Access denied to this bucket")]
    AccessDenied {
        /// The bucket that was refused.
        bucket: String,
    },

    /// The request's signature did not verify.
    #[error("Invalid signature")]
    InvalidSignature,

    /// The request is missing a required component (e.g. an object key on a
    /// method that needs one).
    #[error("Invalid request: {message}")]
    InvalidRequest {
        /// Description of what was missing or malformed.
        message: String,
    },

    /// The addressed object (or a folder on its path) does not exist.
    #[error("NoSuchKey")]
    NotFound {
        /// The key that was not found.
        key: String,
    },

    /// The backend returned a failure the gateway does not classify.
    #[error("{message}")]
    Upstream {
        /// HTTP status reported by the backend, when there was one.
        status: Option<u16>,
        /// The backend's error text.
        message: String,
    },

    /// Internal error with context.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl GatewayError {
    /// Map this error onto the HTTP status code the gateway responds with.
    #[must_use]
    pub fn status_code(&self) -> http::StatusCode {
        match self {
            Self::AccessDenied { .. } | Self::InvalidSignature => http::StatusCode::FORBIDDEN,
            Self::InvalidRequest { .. } => http::StatusCode::BAD_REQUEST,
            Self::NotFound { .. } => http::StatusCode::NOT_FOUND,
            Self::Upstream { .. } | Self::Internal(_) => http::StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Build an [`Upstream`](Self::Upstream) error from a backend response.
    #[must_use]
    pub fn upstream(status: u16, message: impl Into<String>) -> Self {
        Self::Upstream {
            status: Some(status),
            message: message.into(),
        }
    }

    /// Build a [`NotFound`](Self::NotFound) error for a key.
    #[must_use]
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound { key: key.into() }
    }
}

/// Convenience result type for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_map_access_denied_to_403() {
        let err = GatewayError::AccessDenied {
            bucket: "forbidden-bucket".to_owned(),
        };
        assert_eq!(err.status_code(), http::StatusCode::FORBIDDEN);
        assert_eq!(err.to_string(), "Access denied to this bucket");
    }

    #[test]
    fn test_should_map_invalid_signature_to_403() {
        assert_eq!(
            GatewayError::InvalidSignature.status_code(),
            http::StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn test_should_map_not_found_to_404_with_no_such_key_body() {
        let err = GatewayError::not_found("missing.txt");
        assert_eq!(err.status_code(), http::StatusCode::NOT_FOUND);
        assert_eq!(err.to_string(), "NoSuchKey");
    }

    #[test]
    fn test_should_map_invalid_request_to_400() {
        let err = GatewayError::InvalidRequest {
            message: "missing object key".to_owned(),
        };
        assert_eq!(err.status_code(), http::StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_should_carry_upstream_message() {
        let err = GatewayError::upstream(502, "bad gateway from backend");
        assert_eq!(err.status_code(), http::StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.to_string(), "bad gateway from backend");
    }

    #[test]
    fn test_should_map_internal_to_500() {
        let err = GatewayError::Internal(anyhow::anyhow!("socket closed"));
        assert_eq!(err.status_code(), http::StatusCode::INTERNAL_SERVER_ERROR);
    }
}
