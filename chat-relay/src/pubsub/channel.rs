//! Subscriber channels: one bounded inbox per live subscription.
//!
//! A subscription is split in two halves. The [`SubscriberChannel`] is handed
//! to the consumer; the [`Inbox`] stays in the broadcaster registry and is what
//! publishers push into. Both halves share a [`CancellationToken`] that marks
//! the subscription closed.

use std::sync::Arc;

use futures::stream::{self, Stream};
use tokio::sync::mpsc::{self, error::TryRecvError, error::TrySendError};
use tokio_util::sync::CancellationToken;

use crate::ids::SubscriberId;

/// Outcome of offering one event to one inbox
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Offer {
    /// Queued for the consumer
    Delivered,
    /// Queue full, event dropped for this subscriber
    Dropped,
    /// Subscription closed or consumer gone
    Closed,
}

/// Registry-side half of a subscription
#[derive(Debug)]
pub(crate) struct Inbox<T> {
    sender: mpsc::Sender<Arc<T>>,
    closed: CancellationToken,
    generation: u64,
}

impl<T> Clone for Inbox<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            closed: self.closed.clone(),
            generation: self.generation,
        }
    }
}

impl<T> Inbox<T> {
    /// Non-blocking push; never waits on the consumer.
    pub(crate) fn offer(&self, event: Arc<T>) -> Offer {
        if self.closed.is_cancelled() {
            return Offer::Closed;
        }

        match self.sender.try_send(event) {
            Ok(()) => Offer::Delivered,
            Err(TrySendError::Full(_)) => Offer::Dropped,
            Err(TrySendError::Closed(_)) => Offer::Closed,
        }
    }

    /// Mark the subscription closed; the consumer observes it on its next receive.
    pub(crate) fn close(&self) {
        self.closed.cancel();
    }

    /// Registration counter value, used to tell a replaced inbox from its successor.
    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }
}

/// Create both halves of a subscription.
///
/// Capacity is clamped to at least one slot.
pub(crate) fn inbox<T>(
    id: SubscriberId,
    capacity: usize,
    generation: u64,
) -> (Inbox<T>, SubscriberChannel<T>) {
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    let closed = CancellationToken::new();

    let inbox = Inbox {
        sender,
        closed: closed.clone(),
        generation,
    };
    let channel = SubscriberChannel {
        id,
        receiver,
        closed,
    };

    (inbox, channel)
}

/// Consumer-side half of a subscription.
///
/// Once the subscription is closed (unsubscribed, or replaced by a newer
/// subscription under the same id) every receive reports the end of the
/// channel, and anything still queued is discarded.
#[derive(Debug)]
pub struct SubscriberChannel<T> {
    id: SubscriberId,
    receiver: mpsc::Receiver<Arc<T>>,
    closed: CancellationToken,
}

impl<T> SubscriberChannel<T> {
    /// Id this channel was registered under
    pub fn id(&self) -> &SubscriberId {
        &self.id
    }

    /// Wait for the next event.
    ///
    /// Returns `None` once the subscription has been closed.
    pub async fn recv(&mut self) -> Option<Arc<T>> {
        if self.closed.is_cancelled() {
            return None;
        }

        tokio::select! {
            biased;
            _ = self.closed.cancelled() => None,
            event = self.receiver.recv() => event,
        }
    }

    /// Take the next queued event without waiting.
    pub fn try_recv(&mut self) -> Result<Arc<T>, TryRecvError> {
        if self.closed.is_cancelled() {
            return Err(TryRecvError::Disconnected);
        }
        self.receiver.try_recv()
    }

    /// Whether the subscription has been closed
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Token cancelled when the subscription is closed.
    ///
    /// Lets a caller that hands the channel off keep watching for forced closure.
    pub fn closed_token(&self) -> CancellationToken {
        self.closed.clone()
    }

    /// Turn the channel into a stream that ends when the subscription closes.
    pub fn into_stream(self) -> impl Stream<Item = Arc<T>> + Send + 'static
    where
        T: Send + Sync + 'static,
    {
        stream::unfold(self, |mut channel| async move {
            channel.recv().await.map(|event| (event, channel))
        })
    }
}
