//! Streaming transport configuration types.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Streaming transport configuration.
///
/// # Example
///
/// ```toml
/// [sse]
/// keep_alive_interval_secs = 15
/// keep_alive_text = "keep-alive"
/// frame_buffer = 16
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SseConfig {
    /// Keep-alive interval in seconds (default: 15).
    ///
    /// A comment line is written whenever a stream has been idle this long.
    #[serde(default = "default_keep_alive_interval")]
    pub keep_alive_interval_secs: u64,

    /// Keep-alive comment text (default: `keep-alive`, sent as `: keep-alive`).
    #[serde(default = "default_keep_alive_text")]
    pub keep_alive_text: String,

    /// Frames buffered between a session and the HTTP body (default: 16).
    #[serde(default = "default_frame_buffer")]
    pub frame_buffer: usize,
}

impl SseConfig {
    /// Get the keep-alive interval as a Duration.
    ///
    /// Clamped to at least one second.
    #[must_use]
    pub fn keep_alive_interval(&self) -> Duration {
        Duration::from_secs(self.keep_alive_interval_secs.max(1))
    }
}

impl Default for SseConfig {
    fn default() -> Self {
        Self {
            keep_alive_interval_secs: default_keep_alive_interval(),
            keep_alive_text: default_keep_alive_text(),
            frame_buffer: default_frame_buffer(),
        }
    }
}

fn default_keep_alive_interval() -> u64 {
    15
}

fn default_keep_alive_text() -> String {
    "keep-alive".to_string()
}

fn default_frame_buffer() -> usize {
    16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SseConfig::default();
        assert_eq!(config.keep_alive_interval_secs, 15);
        assert_eq!(config.keep_alive_text, "keep-alive");
        assert_eq!(config.frame_buffer, 16);
    }

    #[test]
    fn test_keep_alive_interval() {
        let mut config = SseConfig::default();
        assert_eq!(config.keep_alive_interval(), Duration::from_secs(15));

        config.keep_alive_interval_secs = 0;
        assert_eq!(config.keep_alive_interval(), Duration::from_secs(1));
    }
}
