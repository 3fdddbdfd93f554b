//! Endpoint tuning knobs.

use ezmq_wire::DEFAULT_MAX_FRAME_SIZE;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration shared by publishers and subscribers
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    /// Largest frame accepted or produced, in bytes
    pub max_frame_size: usize,
    /// First delay before a subscriber retries a failed connection
    #[serde(with = "millis")]
    pub reconnect_interval: Duration,
    /// Upper bound for the reconnect backoff
    #[serde(with = "millis")]
    pub max_reconnect_interval: Duration,
    /// How long a subscriber waits for the publisher greeting
    #[serde(with = "millis")]
    pub handshake_timeout: Duration,
    /// Frames buffered between peer readers and the dispatch task
    pub receive_queue: usize,
    /// Frames a publisher queues per subscriber before dropping that subscriber
    pub send_queue: usize,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            reconnect_interval: Duration::from_millis(100),
            max_reconnect_interval: Duration::from_secs(5),
            handshake_timeout: Duration::from_secs(5),
            receive_queue: 1024,
            send_queue: 1024,
        }
    }
}

impl EndpointConfig {
    /// Next reconnect delay after `current`
    pub fn next_backoff(&self, current: Duration) -> Duration {
        (current * 2).min(self.max_reconnect_interval)
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
