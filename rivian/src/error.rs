use rivian_keys::{CommandError, CryptoError};
use rivian_monitor::MonitorError;

use crate::ConfigError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Monitor(#[from] MonitorError),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error(transparent)]
    Command(#[from] CommandError),
    #[cfg(feature = "ble")]
    #[error(transparent)]
    Pairing(#[from] rivian_ble::PairingError),
}
