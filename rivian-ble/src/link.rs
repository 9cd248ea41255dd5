//! The GATT operations pairing needs, independent of the BLE stack.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::{PairingError, PairingState};

/// The next notification on one characteristic.
///
/// Each wait owns its own slot, so a late notification from one step can
/// never be read as the answer to another.
#[derive(Debug)]
pub struct NotificationResponse {
    rx: oneshot::Receiver<Vec<u8>>,
}

impl NotificationResponse {
    /// The sender is handed to whatever delivers notifications
    pub fn channel() -> (oneshot::Sender<Vec<u8>>, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self { rx })
    }

    pub async fn wait(self, step: PairingState, limit: Duration) -> Result<Vec<u8>, PairingError> {
        match tokio::time::timeout(limit, self.rx).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_)) => Err(PairingError::NotificationClosed),
            Err(_) => Err(PairingError::Timeout { step }),
        }
    }
}

/// A connected peripheral, addressed by characteristic UUID
#[async_trait]
pub trait GattLink: Send + Sync {
    /// Enable notifications and arm a response for the next one
    async fn start_notify(&self, characteristic: Uuid) -> Result<NotificationResponse, PairingError>;

    /// Write with response
    async fn write(&self, characteristic: Uuid, data: &[u8]) -> Result<(), PairingError>;

    /// The platform's explicit pairing primitive
    async fn pair(&self) -> Result<(), PairingError>;

    async fn disconnect(&self) -> Result<(), PairingError>;
}
