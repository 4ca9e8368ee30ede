//! Middleware for authentication and request tracking

pub mod auth;
pub mod request_tracking;

pub use auth::{extract_token, BearerAuth, USER_ID_HEADER};
pub use request_tracking::{
    request_id_layer, request_id_propagation_layer, sensitive_headers_layer, SENSITIVE_HEADERS,
};
