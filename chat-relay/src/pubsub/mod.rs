//! Event fan-out
//!
//! A [`PubSub`] backend keeps track of who is listening and delivers every
//! published event to each of them without blocking the publisher. Two
//! backends exist:
//!
//! - [`LocalBroadcaster`]: in-process registry, events never leave the process
//! - [`RedisBridge`]: events travel through a Redis topic and come back to
//!   every process subscribed to it, including the one that published
//!
//! The backend is picked once at startup with [`connect`].
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use chat_relay::pubsub::{LocalBroadcaster, PubSub};
//!
//! # async fn example() -> chat_relay::error::Result<()> {
//! let bus: Arc<dyn PubSub<String>> = Arc::new(LocalBroadcaster::new(1));
//! let mut channel = bus.subscribe("client-1".into());
//!
//! bus.publish(Arc::new("hello".to_string())).await?;
//! assert_eq!(channel.recv().await.as_deref().map(String::as_str), Some("hello"));
//! # Ok(())
//! # }
//! ```

mod channel;
mod local;
mod redis;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use tokio_util::sync::CancellationToken;

pub use channel::SubscriberChannel;
pub use local::{Delivery, LocalBroadcaster};
pub use self::redis::RedisBridge;

use crate::config::{PubSubBackend, PubSubConfig, RedisConfig};
use crate::error::{Error, Result};
use crate::ids::SubscriberId;

/// Subscribe / unsubscribe / publish over some delivery backend
#[async_trait]
pub trait PubSub<T>: Send + Sync
where
    T: Send + Sync + 'static,
{
    /// Open a subscription under `id`, replacing any existing one
    fn subscribe(&self, id: SubscriberId) -> SubscriberChannel<T>;

    /// Close the subscription under `id`; no-op when absent
    fn unsubscribe(&self, id: &SubscriberId);

    /// Publish an event to every subscriber
    ///
    /// Subscriber state never causes an error; only the backend itself can
    /// fail (encoding, bus connectivity).
    async fn publish(&self, event: Arc<T>) -> Result<()>;

    /// Number of subscriptions registered in this process
    fn subscriber_count(&self) -> usize;

    /// Which backend this is
    fn backend(&self) -> PubSubBackend;

    /// Whether the backend can currently deliver events
    fn is_ready(&self) -> bool {
        true
    }
}

#[async_trait]
impl<T> PubSub<T> for LocalBroadcaster<T>
where
    T: Send + Sync + 'static,
{
    fn subscribe(&self, id: SubscriberId) -> SubscriberChannel<T> {
        LocalBroadcaster::subscribe(self, id)
    }

    fn unsubscribe(&self, id: &SubscriberId) {
        LocalBroadcaster::unsubscribe(self, id)
    }

    async fn publish(&self, event: Arc<T>) -> Result<()> {
        let delivery = LocalBroadcaster::publish(self, event);
        tracing::trace!(
            delivered = delivery.delivered,
            dropped = delivery.dropped,
            closed = delivery.closed,
            "Published event locally"
        );
        Ok(())
    }

    fn subscriber_count(&self) -> usize {
        LocalBroadcaster::subscriber_count(self)
    }

    fn backend(&self) -> PubSubBackend {
        PubSubBackend::Local
    }
}

/// Build the configured backend
///
/// The Redis backend requires a `[redis]` section and a reachable server;
/// failing to connect is reported as an error rather than falling back.
pub async fn connect<T>(
    pubsub: &PubSubConfig,
    redis: Option<&RedisConfig>,
    shutdown: CancellationToken,
) -> Result<Arc<dyn PubSub<T>>>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    tracing::info!(
        backend = %pubsub.backend,
        capacity = pubsub.capacity(),
        "Starting pub/sub backend"
    );

    match pubsub.backend {
        PubSubBackend::Local => Ok(Arc::new(LocalBroadcaster::new(pubsub.capacity()))),
        PubSubBackend::Redis => {
            let redis = redis.ok_or_else(|| {
                Error::Internal("pubsub.backend is 'redis' but no [redis] section is configured".to_string())
            })?;
            let bridge = RedisBridge::connect(redis, pubsub, shutdown).await?;
            Ok(Arc::new(bridge))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_local_backend_through_trait() {
        let bus: Arc<dyn PubSub<String>> = Arc::new(LocalBroadcaster::new(1));
        let mut channel = bus.subscribe("a".into());

        assert_eq!(bus.backend(), PubSubBackend::Local);
        assert!(bus.is_ready());
        assert_eq!(bus.subscriber_count(), 1);

        bus.publish(Arc::new("hello".to_string())).await.unwrap();
        assert_eq!(channel.recv().await.unwrap().as_str(), "hello");

        bus.unsubscribe(&"a".into());
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_connect_local_uses_local_capacity() {
        let config = PubSubConfig::default();
        let bus = connect::<String>(&config, None, CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(bus.backend(), PubSubBackend::Local);

        let mut channel = bus.subscribe("a".into());
        bus.publish(Arc::new("one".to_string())).await.unwrap();
        bus.publish(Arc::new("two".to_string())).await.unwrap();

        assert_eq!(channel.recv().await.unwrap().as_str(), "one");
        assert!(channel.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_connect_redis_without_section_fails() {
        let config = PubSubConfig {
            backend: PubSubBackend::Redis,
            ..PubSubConfig::default()
        };

        let result = connect::<String>(&config, None, CancellationToken::new()).await;
        assert!(matches!(result, Err(Error::Internal(_))));
    }
}
