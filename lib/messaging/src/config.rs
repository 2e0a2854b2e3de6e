//! Tunables for delivery and ingest.

use serde::Deserialize;
use std::time::Duration;

/// Messaging configuration, usually nested under `MESSAGING__*`.
#[derive(Debug, Clone, Deserialize)]
pub struct MessagingConfig {
    /// How long one push may wait on a full outbox before it is abandoned.
    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,

    /// Capacity of each connection's outbound queue.
    #[serde(default = "default_outbox_capacity")]
    pub outbox_capacity: usize,

    /// Longest accepted message body, in characters.
    #[serde(default = "default_max_body_len")]
    pub max_body_len: usize,
}

fn default_send_timeout_ms() -> u64 {
    2_000
}

fn default_outbox_capacity() -> usize {
    64
}

fn default_max_body_len() -> usize {
    4_000
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            send_timeout_ms: default_send_timeout_ms(),
            outbox_capacity: default_outbox_capacity(),
            max_body_len: default_max_body_len(),
        }
    }
}

impl MessagingConfig {
    /// The per-connection send timeout.
    #[must_use]
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }
}
