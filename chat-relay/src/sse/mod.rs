//! Event-stream transport
//!
//! Requests that accept `text/event-stream` are answered with a long-lived
//! stream driven by a [`StreamSession`]; everything else gets one JSON body.
//!
//! ```text
//! POST /graphql  Accept: text/event-stream
//! {"query":"subscription { messageAdded { id content } }"}
//!
//! event: next
//! data: {"data":{"messageAdded":{"id":"msg_…","content":"hi",…}}}
//!
//! : keep-alive
//! ```

mod config;
mod negotiate;
mod session;
mod wire;

pub use config::SseConfig;
pub use negotiate::{wants_event_stream, Transport};
pub use session::{respond, EndReason, SessionState, SessionSummary, StreamSession};
pub use wire::{stream_response, Frame, NEXT_EVENT};
