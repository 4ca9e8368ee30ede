//! Shared bearer token authentication
//!
//! When a token is configured every route except `/health` and `/ready`
//! requires `Authorization: Bearer <token>`. The caller's user id travels
//! separately in `X-User-ID` and reaches resolvers through an
//! [`OperationContext`] request extension.

use axum::{
    body::Body,
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

use crate::error::Error;
use crate::operation::OperationContext;

/// Header carrying the caller's user id
pub const USER_ID_HEADER: &str = "x-user-id";

/// Bearer token check plus caller identification
#[derive(Clone, Default)]
pub struct BearerAuth {
    token: Option<Arc<str>>,
}

impl BearerAuth {
    /// Create the middleware state; `None` disables the token check
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: token.filter(|t| !t.is_empty()).map(Arc::from),
        }
    }

    /// Whether a token is required
    pub fn is_enabled(&self) -> bool {
        self.token.is_some()
    }

    /// Validate the bearer token, then attach the caller's context
    pub async fn middleware(
        State(auth): State<Self>,
        mut request: Request<Body>,
        next: Next,
    ) -> Result<Response, Error> {
        let path = request.uri().path();
        if path == "/health" || path == "/ready" {
            return Ok(next.run(request).await);
        }

        if let Some(expected) = &auth.token {
            let token = extract_token(request.headers())?;
            if token != expected.as_ref() {
                tracing::debug!("Rejected request with invalid token");
                return Err(Error::Unauthorized("Invalid token".to_string()));
            }
        }

        let ctx = operation_context(request.headers());
        request.extensions_mut().insert(ctx);

        Ok(next.run(request).await)
    }
}

/// Extract the bearer token from the `Authorization` header
pub fn extract_token(headers: &HeaderMap) -> Result<&str, Error> {
    let header = headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| Error::Unauthorized("Authorization header required".to_string()))?;

    header.strip_prefix("Bearer ").ok_or_else(|| {
        Error::Unauthorized("Invalid authorization format. Use: Bearer <token>".to_string())
    })
}

fn operation_context(headers: &HeaderMap) -> OperationContext {
    let user_id = headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(String::from);

    OperationContext { user_id }
}
