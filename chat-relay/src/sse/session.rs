//! Per-connection stream sessions.
//!
//! A [`StreamSession`] takes one request body, validates it, and then writes
//! results to its connection until the results end, the client goes away,
//! the subscription is closed, or the server shuts down.
//!
//! ```text
//! negotiating ──▶ streaming ──▶ draining ──▶ closed
//!      │                                       ▲
//!      └───────────── rejected ────────────────┘
//! ```
//!
//! Subscription operations register the session id with the executor's
//! broadcaster for the lifetime of the stream and unregister it exactly once
//! on the way out, unless it was already closed from outside.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::response::Response;
use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::config::SseConfig;
use super::wire::{stream_response, Frame};
use crate::ids::SubscriberId;
use crate::operation::{OperationContext, OperationExecutor, OperationRequest, PreparedOperation};

/// Lifecycle of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Reading and validating the request
    Negotiating,
    /// Writing results
    Streaming,
    /// Releasing the subscription
    Draining,
    /// Done; nothing more is written
    Closed,
}

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// Request could not be decoded or validated; one error frame was sent
    RequestRejected,
    /// Single-result operation finished
    Completed,
    /// Connection dropped by the client
    ClientGone,
    /// Subscription closed from the outside
    Unsubscribed,
    /// Server shutting down
    Shutdown,
    /// A result could not be encoded
    EncodeFailed,
}

/// Counters reported when a session ends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSummary {
    /// Result frames written
    pub frames_written: usize,
    /// Keep-alive comments written
    pub keepalives: usize,
    /// Why the session ended
    pub end: EndReason,
}

enum Step<E> {
    Event(Arc<E>),
    KeepAlive,
    End(EndReason),
}

/// Unsubscribes once, on release or on drop
struct SubscriptionGuard<X: OperationExecutor> {
    executor: Arc<X>,
    id: SubscriberId,
    released: bool,
}

impl<X: OperationExecutor> SubscriptionGuard<X> {
    /// The registry entry is already gone (closed or replaced from outside)
    fn disarm(&mut self) {
        self.released = true;
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.executor.unsubscribe(&self.id);
        }
    }
}

impl<X: OperationExecutor> Drop for SubscriptionGuard<X> {
    fn drop(&mut self) {
        self.release();
    }
}

/// One streaming connection
pub struct StreamSession<X: OperationExecutor> {
    id: SubscriberId,
    executor: Arc<X>,
    frames: mpsc::Sender<Frame>,
    shutdown: CancellationToken,
    keep_alive_interval: Duration,
    keep_alive_text: String,
    state: SessionState,
    frames_written: usize,
    keepalives: usize,
}

impl<X: OperationExecutor> StreamSession<X> {
    /// Create a session writing into `frames`
    ///
    /// The session gets a fresh `sub_…` id.
    pub fn new(
        executor: Arc<X>,
        config: &SseConfig,
        frames: mpsc::Sender<Frame>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            id: SubscriberId::generate(),
            executor,
            frames,
            shutdown,
            keep_alive_interval: config.keep_alive_interval(),
            keep_alive_text: config.keep_alive_text.clone(),
            state: SessionState::Negotiating,
            frames_written: 0,
            keepalives: 0,
        }
    }

    /// Use `id` as the subscriber id instead of a generated one
    #[must_use]
    pub fn with_id(mut self, id: SubscriberId) -> Self {
        self.id = id;
        self
    }

    /// Subscriber id of this session
    pub fn id(&self) -> &SubscriberId {
        &self.id
    }

    /// Current state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Drive the session to completion
    pub async fn run(mut self, body: Bytes, ctx: OperationContext) -> SessionSummary {
        tracing::debug!(session_id = %self.id, "Stream session negotiating");

        let prepared = OperationRequest::from_slice(&body).and_then(|request| self.executor.prepare(&request));

        let operation = match prepared {
            Ok(operation) => operation,
            Err(e) => {
                tracing::debug!(session_id = %self.id, error = %e, "Stream request rejected");
                let end = match self.write(Frame::errors([e.public_message()])).await {
                    Ok(()) => EndReason::RequestRejected,
                    Err(end) => end,
                };
                return self.close(end);
            }
        };

        self.state = SessionState::Streaming;

        let end = if operation.is_subscription() {
            self.stream(&operation).await
        } else {
            self.single(&operation, &ctx).await
        };

        self.close(end)
    }

    async fn single(&mut self, operation: &PreparedOperation, ctx: &OperationContext) -> EndReason {
        let response = self.executor.execute(operation, ctx).await;

        if !response.is_empty() {
            let frame = match Frame::next(&response) {
                Ok(frame) => frame,
                Err(e) => {
                    tracing::error!(session_id = %self.id, error = %e, "Failed to encode result");
                    return EndReason::EncodeFailed;
                }
            };
            if let Err(end) = self.write(frame).await {
                return end;
            }
        }

        EndReason::Completed
    }

    async fn stream(&mut self, operation: &PreparedOperation) -> EndReason {
        let mut channel = match self.executor.subscribe(operation, self.id.clone()) {
            Ok(channel) => channel,
            Err(e) => {
                return match self.write(Frame::errors([e.public_message()])).await {
                    Ok(()) => EndReason::RequestRejected,
                    Err(end) => end,
                };
            }
        };

        let mut guard = SubscriptionGuard {
            executor: Arc::clone(&self.executor),
            id: self.id.clone(),
            released: false,
        };

        tracing::debug!(session_id = %self.id, field = %operation.field, "Stream session subscribed");

        let period = self.keep_alive_interval;
        let mut keepalive = time::interval_at(Instant::now() + period, period);
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let end = loop {
            let step = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => Step::End(EndReason::Shutdown),
                _ = self.frames.closed() => Step::End(EndReason::ClientGone),
                event = channel.recv() => match event {
                    Some(event) => Step::Event(event),
                    None => Step::End(EndReason::Unsubscribed),
                },
                _ = keepalive.tick() => Step::KeepAlive,
            };

            let frame = match step {
                Step::End(end) => break end,
                Step::KeepAlive => Frame::KeepAlive(self.keep_alive_text.clone()),
                Step::Event(event) => {
                    let response = self.executor.resolve_event(operation, &event);
                    if response.is_empty() {
                        continue;
                    }
                    match Frame::next(&response) {
                        Ok(frame) => frame,
                        Err(e) => {
                            tracing::error!(session_id = %self.id, error = %e, "Failed to encode result");
                            break EndReason::EncodeFailed;
                        }
                    }
                }
            };

            let is_data = frame.is_data();
            if let Err(end) = self.write(frame).await {
                break end;
            }
            if is_data {
                keepalive.reset();
            }
        };

        self.state = SessionState::Draining;
        drop(channel);
        if end == EndReason::Unsubscribed {
            guard.disarm();
        } else {
            guard.release();
        }

        end
    }

    async fn write(&mut self, frame: Frame) -> Result<(), EndReason> {
        let is_data = frame.is_data();

        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => return Err(EndReason::Shutdown),
            sent = self.frames.send(frame) => {
                if sent.is_err() {
                    return Err(EndReason::ClientGone);
                }
            }
        }

        if is_data {
            self.frames_written += 1;
        } else {
            self.keepalives += 1;
        }
        Ok(())
    }

    fn close(mut self, end: EndReason) -> SessionSummary {
        self.state = SessionState::Closed;

        let summary = SessionSummary {
            frames_written: self.frames_written,
            keepalives: self.keepalives,
            end,
        };

        tracing::debug!(
            session_id = %self.id,
            frames_written = summary.frames_written,
            keepalives = summary.keepalives,
            end = ?summary.end,
            "Stream session closed"
        );

        summary
    }
}

/// Start a session on its own task and return the streaming response
pub fn respond<X: OperationExecutor>(
    executor: Arc<X>,
    config: &SseConfig,
    shutdown: CancellationToken,
    body: Bytes,
    ctx: OperationContext,
) -> Response {
    let (frames, outbound) = mpsc::channel(config.frame_buffer.max(1));
    let session = StreamSession::new(executor, config, frames, shutdown);

    tokio::spawn(session.run(body, ctx));

    stream_response(outbound)
}
