//! # chat-relay
//!
//! Real-time delivery for a GraphQL chat backend: subscription fan-out over an
//! in-process registry or a Redis pub/sub bridge, and Server-Sent Events
//! stream sessions on the same `/graphql` endpoint that serves ordinary
//! queries and mutations.
//!
//! ## Features
//!
//! - **Fan-out**: bounded per-subscriber queues, slow subscribers drop events instead of stalling publishers
//! - **Redis bridge**: every process on a topic sees every message, with reconnect and readiness reporting
//! - **Event streams**: `event: next` frames, idle keep-alives, clean teardown on disconnect or shutdown
//! - **Middleware stack**: bearer auth, request tracking, panic recovery, body size limits
//! - **Health checks**: liveness and readiness probes
//! - **Graceful shutdown**: open streams end on SIGTERM / SIGINT before requests drain
//!
//! ## Example
//!
//! ```rust,no_run
//! use chat_relay::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = Config::load()?;
//!     init_tracing(&config)?;
//!
//!     let state = AppState::builder()
//!         .config(config.clone())
//!         .build()
//!         .await?;
//!
//!     let shutdown = state.shutdown().clone();
//!     Server::new(config)
//!         .serve(router::build(state), shutdown)
//!         .await?;
//!
//!     Ok(())
//! }
//! ```

pub mod chat;
pub mod config;
pub mod error;
pub mod health;
pub mod ids;
pub mod middleware;
pub mod observability;
pub mod operation;
pub mod pubsub;
pub mod router;
pub mod server;
pub mod sse;
pub mod state;

mod cache;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::chat::{MemoryStore, Message, MessageService, RedisStore, Store, User, UserService};
    pub use crate::config::{Config, LogFormat, PubSubBackend, PubSubConfig, RedisConfig};
    pub use crate::error::{Error, ErrorResponse, Result};
    pub use crate::health::{health, readiness};
    pub use crate::ids::{MakeTypedRequestId, RequestId, SubscriberId};
    pub use crate::middleware::{
        request_id_layer, request_id_propagation_layer, sensitive_headers_layer, BearerAuth,
        SENSITIVE_HEADERS,
    };
    pub use crate::observability::init_tracing;
    pub use crate::operation::{
        ChatExecutor, OperationContext, OperationExecutor, OperationRequest, OperationResponse,
    };
    pub use crate::pubsub::{LocalBroadcaster, PubSub, RedisBridge, SubscriberChannel};
    pub use crate::router;
    pub use crate::server::Server;
    pub use crate::sse::{SseConfig, StreamSession, Transport};
    pub use crate::state::{AppState, AppStateBuilder};

    pub use axum::{
        extract::State,
        routing::{get, post},
        Json, Router,
    };
    pub use tokio_util::sync::CancellationToken;
}
