//! Timeouts and reconnect policy for the subscription monitor.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::backoff::Backoff;

/// Monitor configuration.
///
/// Every field has a default, so a partial JSON object is enough:
///
/// ```rust
/// use rivian_monitor::MonitorConfig;
/// use std::time::Duration;
///
/// let config: MonitorConfig = serde_json::from_str(r#"{"request_timeout": 30}"#).unwrap();
/// assert_eq!(config.request_timeout, Duration::from_secs(30));
/// assert_eq!(config.liveness_timeout, Duration::from_secs(60));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Subscription endpoint
    pub url: String,

    /// Value of the `Sec-WebSocket-Protocol` header
    pub subprotocol: String,

    /// Opening the transport (TCP + TLS + upgrade).
    /// Default: 10 seconds
    #[serde(with = "secs")]
    pub connect_timeout: Duration,

    /// How long `subscribe` waits for `connection_ack`.
    /// Default: 10 seconds
    #[serde(with = "secs")]
    pub request_timeout: Duration,

    /// Silence on the socket after which every subscription is re-sent.
    /// Default: 60 seconds
    #[serde(with = "secs")]
    pub liveness_timeout: Duration,

    /// First reconnect delay, doubled per failed attempt.
    /// Default: 1 second
    #[serde(with = "secs")]
    pub reconnect_base: Duration,

    /// Upper bound on any reconnect delay.
    /// Default: 300 seconds
    #[serde(with = "secs")]
    pub reconnect_cap: Duration,

    /// Random extra delay, uniform in `[0, reconnect_jitter)`.
    /// Default: 1 second
    #[serde(with = "secs")]
    pub reconnect_jitter: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            url: rivian_proto::GRAPHQL_WEBSOCKET.to_string(),
            subprotocol: rivian_proto::SUBPROTOCOL.to_string(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(10),
            liveness_timeout: Duration::from_secs(60),
            reconnect_base: Duration::from_secs(1),
            reconnect_cap: Duration::from_secs(300),
            reconnect_jitter: Duration::from_secs(1),
        }
    }
}

impl MonitorConfig {
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_liveness_timeout(mut self, timeout: Duration) -> Self {
        self.liveness_timeout = timeout;
        self
    }

    pub fn with_reconnect(mut self, base: Duration, cap: Duration, jitter: Duration) -> Self {
        self.reconnect_base = base;
        self.reconnect_cap = cap;
        self.reconnect_jitter = jitter;
        self
    }

    pub fn backoff(&self) -> Backoff {
        Backoff::new(self.reconnect_base, self.reconnect_cap, self.reconnect_jitter)
    }
}

/// Durations as fractional seconds
mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
