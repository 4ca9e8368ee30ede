//! Application state management

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::{
    cache,
    chat::{MemoryStore, Message, MessageService, RedisStore, Store, UserService},
    config::{Config, PubSubBackend},
    error::{Error, Result},
    operation::ChatExecutor,
    pubsub::{self, PubSub},
};

/// Application state shared across handlers
///
/// Cloning is cheap; every field is reference counted.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    bus: Arc<dyn PubSub<Message>>,
    executor: Arc<ChatExecutor>,
    shutdown: CancellationToken,
}

impl AppState {
    /// Create a new builder for AppState
    pub fn builder() -> AppStateBuilder {
        AppStateBuilder::new()
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the pub/sub backend
    pub fn bus(&self) -> &Arc<dyn PubSub<Message>> {
        &self.bus
    }

    /// Get the operation executor
    pub fn executor(&self) -> &Arc<ChatExecutor> {
        &self.executor
    }

    /// Token cancelled when the server starts shutting down
    pub fn shutdown(&self) -> &CancellationToken {
        &self.shutdown
    }
}

/// Builder for AppState
#[derive(Default)]
pub struct AppStateBuilder {
    config: Option<Config>,
    store: Option<Arc<dyn Store>>,
    bus: Option<Arc<dyn PubSub<Message>>>,
    shutdown: Option<CancellationToken>,
}

impl AppStateBuilder {
    /// Create a new builder
    ///
    /// By default the config is `Config::default()` and both the pub/sub
    /// backend and the store follow `config.pubsub.backend`: a
    /// [`MemoryStore`] for `local`, a [`RedisStore`] for `redis`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the configuration
    pub fn config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    /// Use a specific store
    pub fn store(mut self, store: Arc<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    /// Use an already-built pub/sub backend instead of connecting one
    pub fn bus(mut self, bus: Arc<dyn PubSub<Message>>) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Share a shutdown token with the caller
    pub fn shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = Some(token);
        self
    }

    /// Build the AppState, connecting the pub/sub backend if none was given
    pub async fn build(self) -> Result<AppState> {
        let config = self.config.unwrap_or_default();
        let shutdown = self.shutdown.unwrap_or_default();

        let bus = match self.bus {
            Some(bus) => bus,
            None => {
                pubsub::connect::<Message>(&config.pubsub, config.redis.as_ref(), shutdown.clone())
                    .await?
            }
        };

        let store = match self.store {
            Some(store) => store,
            None => default_store(&config).await?,
        };

        let users = UserService::new(store.clone());
        let messages = MessageService::new(store, bus.clone());
        let executor = Arc::new(ChatExecutor::new(users, messages));

        Ok(AppState {
            config: Arc::new(config),
            bus,
            executor,
            shutdown,
        })
    }
}

/// Store matching the configured backend
async fn default_store(config: &Config) -> Result<Arc<dyn Store>> {
    match config.pubsub.backend {
        PubSubBackend::Local => Ok(Arc::new(MemoryStore::new())),
        PubSubBackend::Redis => {
            let redis = config.redis.as_ref().ok_or_else(|| {
                Error::Internal("pubsub.backend is 'redis' but no [redis] section is configured".to_string())
            })?;
            let pool = cache::create_pool(redis).await?;

            tracing::info!("Storing users and messages in Redis");
            Ok(Arc::new(RedisStore::new(pool)))
        }
    }
}
