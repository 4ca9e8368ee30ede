//! Redis-backed distributed bridge
//!
//! Publishing serializes the event to JSON and sends it to the shared topic;
//! nothing is delivered locally at that point. A background task holds a
//! subscription on the same topic and hands every decoded event to the local
//! broadcaster, so all processes (the publisher included) deliver from the
//! same stream in the same order.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::{redis::AsyncCommands, Pool};
use futures::stream::{BoxStream, StreamExt};
use serde::{de::DeserializeOwned, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{Delivery, LocalBroadcaster, PubSub, SubscriberChannel};
use crate::cache::{backoff_delay, create_pool};
use crate::config::{PubSubBackend, PubSubConfig, RedisConfig};
use crate::error::Result;
use crate::ids::SubscriberId;

/// Floor for the reconnect backoff so a zero delay cannot spin
const MIN_RECONNECT_DELAY: Duration = Duration::from_millis(100);

/// Bridge between the local registry and a Redis pub/sub topic
pub struct RedisBridge<T> {
    local: LocalBroadcaster<T>,
    pool: Pool,
    topic: String,
    receiving: Arc<AtomicBool>,
    shutdown: CancellationToken,
    receiver: Option<JoinHandle<()>>,
    _event: PhantomData<fn() -> T>,
}

impl<T> std::fmt::Debug for RedisBridge<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisBridge")
            .field("topic", &self.topic)
            .field("receiving", &self.receiving.load(Ordering::Relaxed))
            .field("subscribers", &self.local.subscriber_count())
            .finish()
    }
}

impl<T> RedisBridge<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Connect to Redis and start the receive task
    ///
    /// Both the publish pool and the topic subscription must come up, otherwise
    /// this returns an error and no task is spawned. The task stops when
    /// `shutdown` is cancelled or the bridge is dropped.
    pub async fn connect(
        redis: &RedisConfig,
        pubsub: &PubSubConfig,
        shutdown: CancellationToken,
    ) -> Result<Self> {
        let pool = create_pool(redis).await?;

        let source = RedisTopic {
            client: ::redis::Client::open(redis.url.as_str())?,
            topic: pubsub.topic.clone(),
        };
        let messages = source.open().await?;

        tracing::info!(topic = %pubsub.topic, "Subscribed to Redis topic");

        let local = LocalBroadcaster::new(pubsub.bridged_capacity);
        let receiving = Arc::new(AtomicBool::new(true));
        let shutdown = shutdown.child_token();

        let task = ReceiveTask {
            source,
            topic: pubsub.topic.clone(),
            local: local.clone(),
            receiving: Arc::clone(&receiving),
            shutdown: shutdown.clone(),
            base_delay: redis.retry_delay().max(MIN_RECONNECT_DELAY),
            max_delay: redis.max_reconnect_delay().max(MIN_RECONNECT_DELAY),
        };
        let receiver = tokio::spawn(task.run(messages));

        Ok(Self {
            local,
            pool,
            topic: pubsub.topic.clone(),
            receiving,
            shutdown,
            receiver: Some(receiver),
            _event: PhantomData,
        })
    }

    /// Topic this bridge publishes to and receives from
    pub fn topic(&self) -> &str {
        &self.topic
    }
}

impl<T> Drop for RedisBridge<T> {
    fn drop(&mut self) {
        self.shutdown.cancel();
        if let Some(receiver) = self.receiver.take() {
            receiver.abort();
        }
    }
}

#[async_trait]
impl<T> PubSub<T> for RedisBridge<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    fn subscribe(&self, id: SubscriberId) -> SubscriberChannel<T> {
        self.local.subscribe(id)
    }

    fn unsubscribe(&self, id: &SubscriberId) {
        self.local.unsubscribe(id)
    }

    async fn publish(&self, event: Arc<T>) -> Result<()> {
        let payload = serde_json::to_string(event.as_ref())?;

        let mut conn = self.pool.get().await?;
        let receivers: i64 = conn.publish(&self.topic, payload).await?;

        tracing::trace!(topic = %self.topic, receivers, "Published event to Redis");
        Ok(())
    }

    fn subscriber_count(&self) -> usize {
        self.local.subscriber_count()
    }

    fn backend(&self) -> PubSubBackend {
        PubSubBackend::Redis
    }

    fn is_ready(&self) -> bool {
        self.receiving.load(Ordering::Relaxed)
    }
}

/// Where the receive task reads raw payloads from
#[async_trait]
trait TopicSource: Send + Sync + 'static {
    /// Open a fresh subscription; the stream ends when it is lost
    async fn open(&self) -> Result<BoxStream<'static, String>>;
}

struct RedisTopic {
    client: ::redis::Client,
    topic: String,
}

#[async_trait]
impl TopicSource for RedisTopic {
    async fn open(&self) -> Result<BoxStream<'static, String>> {
        let mut subscription = self.client.get_async_pubsub().await?;
        subscription.subscribe(&self.topic).await?;

        let topic = self.topic.clone();
        let payloads = subscription.into_on_message().filter_map(move |message| {
            let payload = match message.get_payload::<String>() {
                Ok(payload) => Some(payload),
                Err(e) => {
                    tracing::warn!(topic = %topic, error = %e, "Discarding unreadable Redis message");
                    None
                }
            };
            futures::future::ready(payload)
        });

        Ok(payloads.boxed())
    }
}

/// Decode one bus payload and hand it to the local broadcaster
fn dispatch<T>(local: &LocalBroadcaster<T>, payload: &str) -> std::result::Result<Delivery, serde_json::Error>
where
    T: DeserializeOwned,
{
    let event: T = serde_json::from_str(payload)?;
    Ok(local.publish(Arc::new(event)))
}

struct ReceiveTask<T, S> {
    source: S,
    topic: String,
    local: LocalBroadcaster<T>,
    receiving: Arc<AtomicBool>,
    shutdown: CancellationToken,
    base_delay: Duration,
    max_delay: Duration,
}

impl<T, S> ReceiveTask<T, S>
where
    T: DeserializeOwned + Send + Sync + 'static,
    S: TopicSource,
{
    async fn run(self, messages: BoxStream<'static, String>) {
        let mut messages = Some(messages);

        loop {
            let current = match messages.take() {
                Some(current) => current,
                None => match self.reconnect().await {
                    Some(current) => current,
                    None => break,
                },
            };

            self.receiving.store(true, Ordering::Relaxed);
            let finished = self.consume(current).await;
            self.receiving.store(false, Ordering::Relaxed);

            if finished {
                break;
            }

            tracing::warn!(topic = %self.topic, "Redis subscription lost, reconnecting");
        }

        tracing::info!(topic = %self.topic, "Redis receive loop stopped");
    }

    /// Drain messages until the subscription ends (false) or shutdown (true)
    async fn consume(&self, mut messages: BoxStream<'static, String>) -> bool {
        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return true,
                payload = messages.next() => {
                    let Some(payload) = payload else {
                        return false;
                    };

                    match dispatch(&self.local, &payload) {
                        Ok(delivery) => tracing::debug!(
                            delivered = delivery.delivered,
                            dropped = delivery.dropped,
                            closed = delivery.closed,
                            "Delivered event from Redis"
                        ),
                        Err(e) => tracing::warn!(
                            topic = %self.topic,
                            error = %e,
                            "Discarding malformed event from Redis"
                        ),
                    }
                }
            }
        }
    }

    /// Retry with capped exponential backoff; `None` once shut down
    async fn reconnect(&self) -> Option<BoxStream<'static, String>> {
        let mut attempt = 0;

        loop {
            attempt += 1;
            let delay = backoff_delay(self.base_delay, attempt, Some(self.max_delay));

            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return None,
                _ = tokio::time::sleep(delay) => {}
            }

            match self.source.open().await {
                Ok(messages) => {
                    tracing::info!(
                        topic = %self.topic,
                        attempt,
                        "Redis subscription re-established"
                    );
                    return Some(messages);
                }
                Err(e) => tracing::warn!(
                    topic = %self.topic,
                    attempt,
                    error = %e,
                    "Redis reconnect attempt failed. Retrying in at most {:?}",
                    self.max_delay
                ),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use futures::channel::mpsc::{unbounded, UnboundedSender};
    use serde::Deserialize;
    use std::collections::{HashMap, VecDeque};
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Event {
        id: String,
        body: String,
    }

    fn unreachable_config() -> RedisConfig {
        RedisConfig {
            url: "redis://127.0.0.1:1/0".to_string(),
            max_retries: 0,
            retry_delay_secs: 0,
            ..RedisConfig::default()
        }
    }

    fn offline_bridge<T>() -> RedisBridge<T> {
        let config = unreachable_config();
        let pool = deadpool_redis::Config::from_url(&config.url)
            .create_pool(Some(deadpool_redis::Runtime::Tokio1))
            .unwrap();

        RedisBridge {
            local: LocalBroadcaster::new(10),
            pool,
            topic: "chat:messages".to_string(),
            receiving: Arc::new(AtomicBool::new(false)),
            shutdown: CancellationToken::new(),
            receiver: None,
            _event: PhantomData,
        }
    }

    #[test]
    fn test_dispatch_delivers_decoded_event() {
        let local = LocalBroadcaster::<Event>::new(10);
        let mut channel = local.subscribe("a".into());

        let delivery = dispatch(&local, r#"{"id":"e1","body":"hi"}"#).unwrap();
        assert_eq!(delivery.delivered, 1);

        let event = channel.try_recv().unwrap();
        assert_eq!(event.id, "e1");
        assert_eq!(event.body, "hi");
    }

    #[test]
    fn test_dispatch_discards_malformed_payload() {
        let local = LocalBroadcaster::<Event>::new(10);
        let mut channel = local.subscribe("a".into());

        assert!(dispatch(&local, "not json").is_err());
        assert!(dispatch(&local, r#"{"id":1}"#).is_err());
        assert!(channel.try_recv().is_err());
        assert!(local.contains(&"a".into()));
    }

    #[tokio::test]
    async fn test_connect_fails_when_redis_unreachable() {
        let result = RedisBridge::<Event>::connect(
            &unreachable_config(),
            &PubSubConfig::default(),
            CancellationToken::new(),
        )
        .await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_publish_does_not_deliver_locally() {
        let bridge = offline_bridge::<Event>();
        let mut channel = PubSub::subscribe(&bridge, "a".into());

        let event = Arc::new(Event {
            id: "e1".into(),
            body: "hi".into(),
        });
        assert!(PubSub::publish(&bridge, event).await.is_err());
        assert!(channel.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_encoding_failure_aborts_publish() {
        let bridge = offline_bridge::<HashMap<Vec<u8>, u8>>();

        let mut event = HashMap::new();
        event.insert(vec![1, 2], 3);

        let result = PubSub::publish(&bridge, Arc::new(event)).await;
        assert!(matches!(result, Err(Error::Serialization(_))));
    }

    #[tokio::test]
    async fn test_readiness_tracks_receive_loop() {
        let bridge = offline_bridge::<Event>();
        assert_eq!(PubSub::backend(&bridge), PubSubBackend::Redis);
        assert!(!PubSub::is_ready(&bridge));

        bridge.receiving.store(true, Ordering::Relaxed);
        assert!(PubSub::is_ready(&bridge));
    }

    #[tokio::test]
    async fn test_unsubscribe_delegates_to_local_registry() {
        let bridge = offline_bridge::<Event>();
        let channel = PubSub::subscribe(&bridge, "a".into());
        assert_eq!(PubSub::subscriber_count(&bridge), 1);

        PubSub::unsubscribe(&bridge, &"a".into());
        assert_eq!(PubSub::subscriber_count(&bridge), 0);
        assert!(channel.is_closed());
    }

    /// Hands out queued streams in order, then fails every later open
    struct ScriptedSource {
        streams: Mutex<VecDeque<BoxStream<'static, String>>>,
        opens: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl TopicSource for ScriptedSource {
        async fn open(&self) -> Result<BoxStream<'static, String>> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            self.streams
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| Error::Pool("connection refused".to_string()))
        }
    }

    struct Running {
        local: LocalBroadcaster<Event>,
        receiving: Arc<AtomicBool>,
        opens: Arc<AtomicUsize>,
        shutdown: CancellationToken,
        task: JoinHandle<()>,
    }

    /// Start a receive task on `first`, with `later` queued for reconnects
    fn spawn_receiver(first: BoxStream<'static, String>, later: Vec<BoxStream<'static, String>>) -> Running {
        let local = LocalBroadcaster::new(10);
        let receiving = Arc::new(AtomicBool::new(false));
        let opens = Arc::new(AtomicUsize::new(0));
        let shutdown = CancellationToken::new();

        let task = ReceiveTask {
            source: ScriptedSource {
                streams: Mutex::new(later.into()),
                opens: Arc::clone(&opens),
            },
            topic: "chat:messages".to_string(),
            local: local.clone(),
            receiving: Arc::clone(&receiving),
            shutdown: shutdown.clone(),
            base_delay: MIN_RECONNECT_DELAY,
            max_delay: Duration::from_secs(1),
        };

        Running {
            local,
            receiving,
            opens,
            shutdown,
            task: tokio::spawn(task.run(first)),
        }
    }

    fn payload(id: &str) -> String {
        serde_json::to_string(&Event {
            id: id.to_string(),
            body: "hi".to_string(),
        })
        .unwrap()
    }

    fn send(tx: &UnboundedSender<String>, payload: impl Into<String>) {
        tx.unbounded_send(payload.into()).unwrap();
    }

    async fn wait_for(mut done: impl FnMut() -> bool) {
        for _ in 0..1000 {
            if done() {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn test_malformed_message_does_not_stop_receiving() {
        let (tx, rx) = unbounded();
        let running = spawn_receiver(rx.boxed(), Vec::new());
        let mut channel = running.local.subscribe("a".into());

        send(&tx, payload("e1"));
        send(&tx, "not json");
        send(&tx, r#"{"id":7}"#);
        send(&tx, payload("e2"));

        let first = tokio::time::timeout(Duration::from_secs(5), channel.recv()).await.unwrap().unwrap();
        let second = tokio::time::timeout(Duration::from_secs(5), channel.recv()).await.unwrap().unwrap();
        assert_eq!(first.id, "e1");
        assert_eq!(second.id, "e2");
        assert!(running.receiving.load(Ordering::Relaxed));
        assert!(!running.task.is_finished());

        running.shutdown.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_lost_subscription_clears_readiness_and_reconnects() {
        let (first_tx, first_rx) = unbounded();
        let (second_tx, second_rx) = unbounded();
        let running = spawn_receiver(first_rx.boxed(), vec![second_rx.boxed()]);
        let mut channel = running.local.subscribe("a".into());

        wait_for(|| running.receiving.load(Ordering::Relaxed)).await;

        drop(first_tx);
        wait_for(|| !running.receiving.load(Ordering::Relaxed)).await;
        assert_eq!(running.opens.load(Ordering::SeqCst), 0);

        tokio::time::sleep(MIN_RECONNECT_DELAY * 2).await;
        wait_for(|| running.receiving.load(Ordering::Relaxed)).await;
        assert_eq!(running.opens.load(Ordering::SeqCst), 1);

        send(&second_tx, payload("after"));
        let event = channel.recv().await.unwrap();
        assert_eq!(event.id, "after");

        running.shutdown.cancel();
        running.task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_reconnects_keep_retrying_until_shutdown() {
        let (tx, rx) = unbounded::<String>();
        let running = spawn_receiver(rx.boxed(), Vec::new());
        drop(tx);

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(running.opens.load(Ordering::SeqCst) >= 2);
        assert!(!running.receiving.load(Ordering::Relaxed));

        running.shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), running.task)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_stops_receive_task() {
        let (tx, rx) = unbounded::<String>();
        let running = spawn_receiver(rx.boxed(), Vec::new());
        wait_for(|| running.receiving.load(Ordering::Relaxed)).await;

        running.shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), running.task)
            .await
            .unwrap()
            .unwrap();

        assert!(!running.receiving.load(Ordering::Relaxed));
        assert_eq!(running.opens.load(Ordering::SeqCst), 0);
        drop(tx);
    }
}
