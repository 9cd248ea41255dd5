use rivian_keys::CryptoError;
use uuid::Uuid;

use crate::PairingState;

#[derive(Debug, thiserror::Error)]
pub enum PairingError {
    #[error("timed out waiting for the vehicle after {step}")]
    Timeout { step: PairingState },
    #[error("vehicle identity mismatch: expected {expected}, received {received}")]
    IdentityMismatch { expected: String, received: String },
    #[error("invalid identifier: {0:?}")]
    InvalidIdentifier(String),
    #[error("no Bluetooth adapter found")]
    NoAdapter,
    #[error("no `{0}` peripheral found")]
    DeviceNotFound(&'static str),
    #[error("characteristic {0} not found")]
    CharacteristicNotFound(Uuid),
    #[error("notification stream ended before a response arrived")]
    NotificationClosed,
    #[error("{0} is not supported on this platform")]
    Unsupported(&'static str),
    #[error(transparent)]
    Ble(#[from] btleplug::Error),
    #[error("BlueZ: {0}")]
    Bluez(String),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}
