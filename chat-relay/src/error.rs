//! Error types and HTTP response conversion

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type alias using the crate error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the relay
///
/// Large error variants are boxed to reduce stack size
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(Box<figment::Error>),

    /// Redis error
    #[error("Redis error: {0}")]
    Redis(Box<redis::RedisError>),

    /// Redis pool error (build or checkout)
    #[error("Redis pool error: {0}")]
    Pool(String),

    /// JSON encoding or decoding failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Authentication error
    #[error("Authentication failed: {0}")]
    Unauthorized(String),

    /// Bad request
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Validation error (422)
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Internal server error
    #[error("Internal server error: {0}")]
    Internal(String),
}

/// A single entry of an error response body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEntry {
    /// Error message
    pub message: String,

    /// Response field the error belongs to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<String>>,

    /// Machine-readable details
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<ErrorExtensions>,
}

impl ErrorEntry {
    /// An entry with only a message
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            path: None,
            extensions: None,
        }
    }

    /// Attach the response path
    #[must_use]
    pub fn at(mut self, field: impl Into<String>) -> Self {
        self.path = Some(vec![field.into()]);
        self
    }

    /// Attach an error code
    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.extensions = Some(ErrorExtensions { code: code.into() });
        self
    }
}

/// Extensions attached to an [`ErrorEntry`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorExtensions {
    /// Error code
    pub code: String,
}

/// Error response body, shaped like a GraphQL error list
///
/// ```json
/// {"errors":[{"message":"Invalid token","extensions":{"code":"UNAUTHORIZED"}}]}
/// ```
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Reported errors
    pub errors: Vec<ErrorEntry>,
}

impl ErrorResponse {
    /// Create an error response with a single message
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            errors: vec![ErrorEntry::new(message)],
        }
    }

    /// Create error response with a code
    pub fn with_code(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            errors: vec![ErrorEntry::new(message).with_code(code)],
        }
    }
}

impl Error {
    /// HTTP status for this error
    pub fn status(&self) -> StatusCode {
        match self {
            Error::Config(_)
            | Error::Redis(_)
            | Error::Serialization(_)
            | Error::Io(_)
            | Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Pool(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Error::BadRequest(_) => StatusCode::BAD_REQUEST,
            Error::ValidationError(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }

    /// Machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            Error::Config(_) => "CONFIG_ERROR",
            Error::Redis(_) => "PUBSUB_ERROR",
            Error::Pool(_) => "REDIS_UNAVAILABLE",
            Error::Serialization(_) => "SERIALIZATION_ERROR",
            Error::Io(_) => "IO_ERROR",
            Error::Unauthorized(_) => "UNAUTHORIZED",
            Error::BadRequest(_) => "BAD_REQUEST",
            Error::ValidationError(_) => "VALIDATION_ERROR",
            Error::NotFound(_) => "NOT_FOUND",
            Error::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Message safe to show to a client
    ///
    /// Client errors carry their own message; server-side failures are
    /// logged at `error` and replaced by a generic text.
    pub fn public_message(&self) -> String {
        match self {
            Error::Config(e) => e.to_string(),
            Error::Unauthorized(msg)
            | Error::BadRequest(msg)
            | Error::ValidationError(msg)
            | Error::NotFound(msg) => msg.clone(),
            Error::Redis(e) => {
                tracing::error!("Redis error: {}", e);
                "Event delivery failed".to_string()
            }
            Error::Pool(e) => {
                tracing::error!("Redis pool error: {}", e);
                "Event bus unavailable".to_string()
            }
            Error::Serialization(e) => {
                tracing::error!("Serialization error: {}", e);
                "Failed to encode response".to_string()
            }
            Error::Io(e) => {
                tracing::error!("I/O error: {}", e);
                "I/O operation failed".to_string()
            }
            Error::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                "Internal server error".to_string()
            }
        }
    }

    /// Convert into a response body entry
    pub fn to_entry(&self) -> ErrorEntry {
        ErrorEntry::new(self.public_message()).with_code(self.code())
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            errors: vec![self.to_entry()],
        };

        (self.status(), Json(body)).into_response()
    }
}

impl fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let messages: Vec<&str> = self.errors.iter().map(|e| e.message.as_str()).collect();
        write!(f, "{}", messages.join("; "))
    }
}

// Manual From implementations for boxed errors
impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Error::Config(Box::new(err))
    }
}

impl From<redis::RedisError> for Error {
    fn from(err: redis::RedisError) -> Self {
        Error::Redis(Box::new(err))
    }
}

impl From<deadpool_redis::PoolError> for Error {
    fn from(err: deadpool_redis::PoolError) -> Self {
        Error::Pool(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_response() {
        let err = ErrorResponse::new("User not found");
        assert_eq!(err.errors.len(), 1);
        assert_eq!(err.errors[0].message, "User not found");
        assert!(err.errors[0].extensions.is_none());
    }

    #[test]
    fn test_entry_with_path() {
        let entry = ErrorEntry::new("user not found").at("sendMessage");
        assert_eq!(
            serde_json::to_string(&entry).unwrap(),
            r#"{"message":"user not found","path":["sendMessage"]}"#
        );
    }

    #[test]
    fn test_error_response_serializes_like_graphql() {
        let err = ErrorResponse::with_code("UNAUTHORIZED", "Invalid token");
        let json = serde_json::to_string(&err).unwrap();
        assert_eq!(
            json,
            r#"{"errors":[{"message":"Invalid token","extensions":{"code":"UNAUTHORIZED"}}]}"#
        );
    }

    #[test]
    fn test_status_mapping() {
        let cases = [
            (Error::Unauthorized("x".into()), StatusCode::UNAUTHORIZED),
            (Error::BadRequest("x".into()), StatusCode::BAD_REQUEST),
            (Error::ValidationError("x".into()), StatusCode::UNPROCESSABLE_ENTITY),
            (Error::NotFound("x".into()), StatusCode::NOT_FOUND),
            (Error::Pool("x".into()), StatusCode::SERVICE_UNAVAILABLE),
            (Error::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }

    #[test]
    fn test_public_message_hides_internal_details() {
        assert_eq!(Error::NotFound("user not found".into()).public_message(), "user not found");
        assert_eq!(
            Error::Internal("lock poisoned at store.rs".into()).public_message(),
            "Internal server error"
        );

        let entry = Error::ValidationError("bad".into()).to_entry();
        assert_eq!(entry.extensions.unwrap().code, "VALIDATION_ERROR");
    }

    #[test]
    fn test_display_joins_messages() {
        let mut err = ErrorResponse::new("first");
        err.errors.push(ErrorEntry::new("second"));
        assert_eq!(err.to_string(), "first; second");
    }
}
