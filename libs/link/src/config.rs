use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::buffer::DrainOrder;

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(20);
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_FRAME_TIMEOUT: Duration = Duration::from_secs(1);

/// Longest inbound line accepted (16MB)
pub const DEFAULT_MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Tunables for one endpoint
///
/// Deserializes from any serde format; missing fields take their defaults and
/// durations are given in milliseconds.
///
/// ```
/// use std::time::Duration;
/// use tandem_link::EndpointConfig;
///
/// let config = EndpointConfig::default()
///     .connect_timeout(Duration::from_secs(1))
///     .manual_check(true);
/// assert!(config.manual_check);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    /// Bound for one connect or accept attempt
    #[serde(rename = "connect_timeout_ms", with = "millis")]
    pub connect_timeout: Duration,

    /// Pause between cycles when nothing arrived
    #[serde(rename = "poll_interval_ms", with = "millis")]
    pub poll_interval: Duration,

    /// Bound for writing one frame
    #[serde(rename = "write_timeout_ms", with = "millis")]
    pub write_timeout: Duration,

    /// Bound for finishing a line whose first bytes have arrived
    #[serde(rename = "frame_timeout_ms", with = "millis")]
    pub frame_timeout: Duration,

    pub max_frame_len: usize,

    /// Never poll in the background; cycles only run through `force_check`
    pub manual_check: bool,

    pub drain_order: DrainOrder,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            frame_timeout: DEFAULT_FRAME_TIMEOUT,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
            manual_check: false,
            drain_order: DrainOrder::default(),
        }
    }
}

impl EndpointConfig {
    /// Set the connect/accept timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the idle pause between poll cycles
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the per-frame write timeout
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Set how long a partially received line may take to complete
    pub fn frame_timeout(mut self, timeout: Duration) -> Self {
        self.frame_timeout = timeout;
        self
    }

    /// Set the maximum inbound line length
    pub fn max_frame_len(mut self, len: usize) -> Self {
        self.max_frame_len = len;
        self
    }

    /// Enable or disable manual-check mode
    pub fn manual_check(mut self, manual: bool) -> Self {
        self.manual_check = manual;
        self
    }

    /// Set the outbound drain order
    pub fn drain_order(mut self, order: DrainOrder) -> Self {
        self.drain_order = order;
        self
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let ms = u64::try_from(value.as_millis()).unwrap_or(u64::MAX);
        serializer.serialize_u64(ms)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
