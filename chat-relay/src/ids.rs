//! Identifiers built on the TypeID format
//!
//! Generated identifiers carry a short prefix naming what they identify
//! (`req_`, `sub_`, `msg_`, `usr_`) followed by a base32 UUIDv7, so they sort
//! by creation time and are easy to pick out in logs.
//!
//! ```rust
//! use chat_relay::ids::{RequestId, SubscriberId};
//!
//! let request_id = RequestId::new();
//! assert!(request_id.as_str().starts_with("req_"));
//!
//! let subscriber = SubscriberId::generate();
//! assert!(subscriber.as_str().starts_with("sub_"));
//! ```

use http::Request;
use mti::prelude::*;
use std::fmt;
use tower_http::request_id::{MakeRequestId, RequestId as TowerRequestId};

/// A type-safe request identifier for distributed tracing.
///
/// Format: `req_<base32-encoded-uuidv7>`, e.g. `req_01h455vb4pex5vsknk084sn02q`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestId(MagicTypeId);

impl RequestId {
    /// The prefix used for request IDs
    pub const PREFIX: &'static str = "req";

    /// Creates a new request ID with a UUIDv7 (time-sortable).
    #[must_use]
    pub fn new() -> Self {
        Self(Self::PREFIX.create_type_id::<V7>())
    }

    /// Returns the request ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A `MakeRequestId` implementation that generates [`RequestId`]s for tower-http.
#[derive(Debug, Clone, Copy, Default)]
pub struct MakeTypedRequestId;

impl MakeRequestId for MakeTypedRequestId {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<TowerRequestId> {
        let id = RequestId::new();
        let header_value = http::HeaderValue::from_str(id.as_str()).ok()?;
        Some(TowerRequestId::new(header_value))
    }
}

/// Identity of one subscription in a broadcaster registry.
///
/// Opaque to the broadcaster: any string chosen by whoever opens the
/// subscription works, as long as it is unique per live connection.
/// [`SubscriberId::generate`] produces a fresh `sub_…` TypeID.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriberId(String);

impl SubscriberId {
    /// The prefix used for generated subscriber IDs
    pub const PREFIX: &'static str = "sub";

    /// Generate a new unique subscriber ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(Self::PREFIX.create_type_id::<V7>().to_string())
    }

    /// Returns the subscriber ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for SubscriberId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for SubscriberId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// New `msg_…` identifier for a chat message
#[must_use]
pub fn new_message_id() -> String {
    "msg".create_type_id::<V7>().to_string()
}

/// New `usr_…` identifier for a chat user
#[must_use]
pub fn new_user_id() -> String {
    "usr".create_type_id::<V7>().to_string()
}
