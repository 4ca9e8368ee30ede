//! Event-stream framing.
//!
//! Every result travels as `event: next\ndata: <json>\n\n`. Keep-alives are
//! comment lines (`: keep-alive\n\n`) that event-stream clients ignore.
//! Errors raised before a stream starts use the same `next` event with an
//! `{"errors":[…]}` body; there is no separate error event.

use std::convert::Infallible;

use axum::{
    http::{header, HeaderName, HeaderValue},
    response::{
        sse::{Event, Sse},
        IntoResponse, Response,
    },
};
use futures::StreamExt;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::error::{ErrorEntry, ErrorResponse};

/// Event name carried by every result frame
pub const NEXT_EVENT: &str = "next";

/// Disables proxy buffering (nginx) so frames reach the client immediately
static X_ACCEL_BUFFERING: HeaderName = HeaderName::from_static("x-accel-buffering");

/// One unit written to an event stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A result: JSON body sent as a `next` event
    Next(String),
    /// A comment line keeping the connection alive
    KeepAlive(String),
}

impl Frame {
    /// Serialize `body` into a `next` frame.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn next<T: Serialize>(body: &T) -> Result<Self, serde_json::Error> {
        Ok(Self::Next(serde_json::to_string(body)?))
    }

    /// A `next` frame carrying `{"errors":[{"message":…}]}`.
    pub fn errors<I, S>(messages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let body = ErrorResponse {
            errors: messages
                .into_iter()
                .map(ErrorEntry::new)
                .collect(),
        };

        // A list of plain strings always serializes
        Self::Next(serde_json::to_string(&body).unwrap_or_else(|_| r#"{"errors":[]}"#.to_string()))
    }

    /// Whether this frame carries a result
    pub fn is_data(&self) -> bool {
        matches!(self, Self::Next(_))
    }

    /// Convert to an axum SSE event.
    pub fn into_event(self) -> Event {
        match self {
            Self::Next(json) => Event::default().event(NEXT_EVENT).data(json),
            Self::KeepAlive(text) => Event::default().comment(text),
        }
    }
}

/// Build the streaming HTTP response that writes every frame from `frames`.
///
/// The body ends when the sender side is dropped. Dropping the body (client
/// gone) closes the receiver, which the sender observes.
pub fn stream_response(frames: mpsc::Receiver<Frame>) -> Response {
    let events = ReceiverStream::new(frames).map(|frame| Ok::<_, Infallible>(frame.into_event()));

    (
        [
            (header::CACHE_CONTROL, HeaderValue::from_static("no-cache")),
            (X_ACCEL_BUFFERING.clone(), HeaderValue::from_static("no")),
        ],
        Sse::new(events),
    )
        .into_response()
}
