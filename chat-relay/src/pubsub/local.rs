//! In-process broadcaster
//!
//! Holds the registry of live subscriptions for one process and fans each
//! published event out to every registered inbox. Publishing never waits on
//! a consumer: a full inbox simply misses the event.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::channel::{inbox, Inbox, Offer, SubscriberChannel};
use crate::ids::SubscriberId;

/// Per-publish delivery counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
    /// Subscribers that received the event
    pub delivered: usize,
    /// Subscribers whose queue was full
    pub dropped: usize,
    /// Subscribers found closed and pruned
    pub closed: usize,
}

impl Delivery {
    /// Number of subscribers in the snapshot the event was offered to
    pub fn attempted(&self) -> usize {
        self.delivered + self.dropped + self.closed
    }
}

type Registry<T> = HashMap<SubscriberId, Inbox<T>>;

/// Registry of subscriber inboxes for one process
///
/// Cloning yields another handle onto the same registry.
#[derive(Debug)]
pub struct LocalBroadcaster<T> {
    registry: Arc<Mutex<Registry<T>>>,
    capacity: usize,
    generation: Arc<AtomicU64>,
}

impl<T> Clone for LocalBroadcaster<T> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            capacity: self.capacity,
            generation: Arc::clone(&self.generation),
        }
    }
}

impl<T> LocalBroadcaster<T> {
    /// Create an empty broadcaster whose inboxes hold `capacity` events
    pub fn new(capacity: usize) -> Self {
        Self {
            registry: Arc::new(Mutex::new(HashMap::new())),
            capacity: capacity.max(1),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Per-subscriber queue capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn registry(&self) -> MutexGuard<'_, Registry<T>> {
        // The map stays consistent even if a holder panicked mid-operation
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a fresh inbox under `id`
    ///
    /// An existing subscription with the same id is replaced and closed, so its
    /// consumer sees the end of its channel.
    pub fn subscribe(&self, id: SubscriberId) -> SubscriberChannel<T> {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let (inbox, channel) = inbox(id.clone(), self.capacity, generation);

        let replaced = self.registry().insert(id.clone(), inbox);

        if let Some(old) = replaced {
            old.close();
            tracing::debug!(subscriber_id = %id, "Replaced existing subscription");
        } else {
            tracing::debug!(subscriber_id = %id, "Subscribed");
        }

        channel
    }

    /// Close and remove the subscription under `id`; no-op when absent
    pub fn unsubscribe(&self, id: &SubscriberId) {
        let removed = self.registry().remove(id);

        if let Some(inbox) = removed {
            inbox.close();
            tracing::debug!(subscriber_id = %id, "Unsubscribed");
        }
    }

    /// Offer `event` to every registered subscriber without blocking
    ///
    /// The registry is snapshotted under the lock and the sends happen after
    /// it is released. Inboxes found closed are pruned unless they were
    /// replaced in the meantime.
    pub fn publish(&self, event: Arc<T>) -> Delivery {
        let snapshot: Vec<(SubscriberId, Inbox<T>)> = self
            .registry()
            .iter()
            .map(|(id, inbox)| (id.clone(), inbox.clone()))
            .collect();

        let mut delivery = Delivery::default();
        let mut stale = Vec::new();

        for (id, inbox) in snapshot {
            match inbox.offer(Arc::clone(&event)) {
                Offer::Delivered => delivery.delivered += 1,
                Offer::Dropped => {
                    delivery.dropped += 1;
                    tracing::debug!(subscriber_id = %id, "Subscriber queue full, event dropped");
                }
                Offer::Closed => {
                    delivery.closed += 1;
                    stale.push((id, inbox.generation()));
                }
            }
        }

        if !stale.is_empty() {
            let mut registry = self.registry();
            for (id, generation) in stale {
                if registry.get(&id).map(Inbox::generation) == Some(generation) {
                    registry.remove(&id);
                    tracing::debug!(subscriber_id = %id, "Pruned closed subscription");
                }
            }
        }

        delivery
    }

    /// Number of registered subscriptions
    pub fn subscriber_count(&self) -> usize {
        self.registry().len()
    }

    /// Whether a subscription is registered under `id`
    pub fn contains(&self, id: &SubscriberId) -> bool {
        self.registry().contains_key(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::mpsc::error::TryRecvError;

    #[derive(Debug, PartialEq)]
    struct Event {
        id: String,
        body: String,
        created_at: u64,
    }

    fn event(id: &str) -> Arc<Event> {
        Arc::new(Event {
            id: id.to_string(),
            body: format!("body of {}", id),
            created_at: 1_700_000_000,
        })
    }

    #[tokio::test]
    async fn test_fan_out_shares_one_event() {
        let broadcaster = LocalBroadcaster::new(1);
        let mut a = broadcaster.subscribe("a".into());
        let mut b = broadcaster.subscribe("b".into());

        let sent = event("e1");
        let delivery = broadcaster.publish(Arc::clone(&sent));
        assert_eq!(delivery.delivered, 2);

        let got_a = a.recv().await.unwrap();
        let got_b = b.recv().await.unwrap();
        assert_eq!(*got_a, *sent);
        assert!(Arc::ptr_eq(&got_a, &got_b));
        assert!(Arc::ptr_eq(&got_a, &sent));
    }

    #[tokio::test]
    async fn test_full_queue_keeps_first_event() {
        let broadcaster = LocalBroadcaster::new(1);
        let mut channel = broadcaster.subscribe("a".into());

        assert_eq!(broadcaster.publish(event("first")).delivered, 1);
        assert_eq!(broadcaster.publish(event("second")).dropped, 1);

        assert_eq!(channel.recv().await.unwrap().id, "first");
        assert!(matches!(channel.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn test_slow_subscriber_does_not_block_others() {
        let broadcaster = LocalBroadcaster::new(1);
        let _slow = broadcaster.subscribe("slow".into());
        let mut fast = broadcaster.subscribe("fast".into());

        for i in 0..3 {
            let id = format!("e{}", i);
            let result = tokio::time::timeout(Duration::from_millis(100), async {
                broadcaster.publish(event(&id))
            })
            .await;
            assert!(result.is_ok());
            assert_eq!(fast.recv().await.unwrap().id, id);
        }
    }

    #[tokio::test]
    async fn test_resubscribe_closes_previous_channel() {
        let broadcaster = LocalBroadcaster::new(4);
        let mut old = broadcaster.subscribe("a".into());
        let mut new = broadcaster.subscribe("a".into());

        assert_eq!(broadcaster.subscriber_count(), 1);
        assert!(old.recv().await.is_none());

        broadcaster.publish(event("e1"));
        assert_eq!(new.recv().await.unwrap().id, "e1");
    }

    #[tokio::test]
    async fn test_unsubscribe_closes_and_removes() {
        let broadcaster = LocalBroadcaster::new(4);
        let mut channel = broadcaster.subscribe("a".into());
        broadcaster.publish(event("queued"));

        broadcaster.unsubscribe(&"a".into());

        assert!(!broadcaster.contains(&"a".into()));
        assert!(channel.recv().await.is_none());
    }

    #[test]
    fn test_publish_after_unsubscribe_is_harmless() {
        let broadcaster = LocalBroadcaster::new(1);
        let channel = broadcaster.subscribe("a".into());
        broadcaster.unsubscribe(&"a".into());

        let delivery = broadcaster.publish(event("late"));
        assert_eq!(delivery.attempted(), 0);
        assert!(channel.is_closed());
    }

    #[test]
    fn test_unsubscribe_unknown_is_noop() {
        let broadcaster = LocalBroadcaster::<Event>::new(1);
        broadcaster.unsubscribe(&"missing".into());
        assert_eq!(broadcaster.subscriber_count(), 0);
    }

    #[test]
    fn test_dropped_consumer_is_pruned_on_publish() {
        let broadcaster = LocalBroadcaster::new(1);
        let channel = broadcaster.subscribe("gone".into());
        let _kept = broadcaster.subscribe("kept".into());
        drop(channel);

        let delivery = broadcaster.publish(event("e1"));
        assert_eq!(delivery.closed, 1);
        assert_eq!(delivery.delivered, 1);
        assert!(!broadcaster.contains(&"gone".into()));
        assert!(broadcaster.contains(&"kept".into()));
    }

    #[test]
    fn test_prune_spares_replacement() {
        let broadcaster = LocalBroadcaster::new(1);
        let old = broadcaster.subscribe("a".into());

        let id = SubscriberId::from("a");

        let stale_generation = broadcaster.registry().get(&id).unwrap().generation();
        drop(old);
        let _new = broadcaster.subscribe(id.clone());

        let current = broadcaster.registry().get(&id).unwrap().generation();
        assert_ne!(stale_generation, current);

        assert_eq!(broadcaster.publish(event("e1")).delivered, 1);
        assert!(broadcaster.contains(&id));
    }

    #[tokio::test]
    async fn test_concurrent_publish_and_unsubscribe() {
        let broadcaster = LocalBroadcaster::new(8);
        let mut channels = Vec::new();
        for i in 0..32 {
            channels.push(broadcaster.subscribe(format!("s{}", i).into()));
        }

        let publisher = {
            let broadcaster = broadcaster.clone();
            tokio::spawn(async move {
                for i in 0..100 {
                    broadcaster.publish(event(&format!("e{}", i)));
                    tokio::task::yield_now().await;
                }
            })
        };
        let unsubscriber = {
            let broadcaster = broadcaster.clone();
            tokio::spawn(async move {
                for i in 0..32 {
                    broadcaster.unsubscribe(&format!("s{}", i).into());
                    tokio::task::yield_now().await;
                }
            })
        };

        publisher.await.unwrap();
        unsubscriber.await.unwrap();

        assert_eq!(broadcaster.subscriber_count(), 0);
        for mut channel in channels {
            assert!(channel.recv().await.is_none());
        }
    }

    #[tokio::test]
    async fn test_per_subscriber_fifo() {
        let broadcaster = LocalBroadcaster::new(16);
        let mut channel = broadcaster.subscribe("a".into());

        for i in 0..10 {
            broadcaster.publish(event(&format!("e{}", i)));
        }
        for i in 0..10 {
            assert_eq!(channel.recv().await.unwrap().id, format!("e{}", i));
        }
    }
}
