use std::time::Duration;

use crate::transport::TransportError;

#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("connection was not acknowledged within {0:?}")]
    ConnectionTimeout(Duration),
    #[error("not connected")]
    NotConnected,
    #[error("monitor is closed")]
    Closed,
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("failed to encode frame: {0}")]
    Encode(#[from] serde_json::Error),
}
