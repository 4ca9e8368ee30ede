//! Transport selection from the `Accept` header.

use axum::http::{header, HeaderMap};

const EVENT_STREAM: &str = "text/event-stream";

/// How a request's results are delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    /// Long-lived event stream
    EventStream,
    /// One JSON response body
    Single,
}

impl Transport {
    /// Pick the transport for a request.
    ///
    /// Any `Accept` value mentioning `text/event-stream` (case-insensitive)
    /// selects the event stream.
    pub fn negotiate(headers: &HeaderMap) -> Self {
        if wants_event_stream(headers) {
            Self::EventStream
        } else {
            Self::Single
        }
    }
}

/// Whether any `Accept` header names `text/event-stream`
pub fn wants_event_stream(headers: &HeaderMap) -> bool {
    headers
        .get_all(header::ACCEPT)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .any(|value| value.to_ascii_lowercase().contains(EVENT_STREAM))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn accept(values: &[&'static str]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for value in values {
            headers.append(header::ACCEPT, HeaderValue::from_static(value));
        }
        headers
    }

    #[test]
    fn test_event_stream_accept() {
        assert_eq!(Transport::negotiate(&accept(&["text/event-stream"])), Transport::EventStream);
    }

    #[test]
    fn test_case_insensitive_substring() {
        let headers = accept(&["application/json, Text/Event-Stream;q=0.9"]);
        assert_eq!(Transport::negotiate(&headers), Transport::EventStream);
    }

    #[test]
    fn test_repeated_accept_headers() {
        let headers = accept(&["application/json", "text/event-stream"]);
        assert!(wants_event_stream(&headers));
    }

    #[test]
    fn test_json_and_missing_accept() {
        assert_eq!(Transport::negotiate(&accept(&["application/json"])), Transport::Single);
        assert_eq!(Transport::negotiate(&HeaderMap::new()), Transport::Single);
    }
}
