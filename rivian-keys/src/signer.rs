//! Message framing for the two signed payloads the vehicle accepts
//!
//! BLE pairing signs the raw 16-byte phone nonce and writes the tag as
//! bytes. Remote commands sign `command || timestamp` (UTF-8, no
//! separator) and submit the tag as lowercase hex next to the same
//! timestamp string.

use std::time::{SystemTime, UNIX_EPOCH};

use data_encoding::HEXLOWER;
use rand::RngCore;
use serde::Serialize;

use crate::CryptoError;
use crate::keys::{self, MAC_LEN};

pub const NONCE_LEN: usize = 16;

pub fn generate_nonce() -> [u8; NONCE_LEN] {
    let mut nonce = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce);
    nonce
}

pub fn sign_ble_nonce(
    nonce: &[u8],
    vehicle_key: &str,
    private_key: &str,
) -> Result<[u8; MAC_LEN], CryptoError> {
    let key = keys::derive_shared_key(private_key, vehicle_key)?;
    keys::sign(&key[..], nonce)
}

/// `nonce || hmac`, as written to the nonce characteristic
pub fn pairing_payload(nonce: &[u8; NONCE_LEN], mac: &[u8; MAC_LEN]) -> [u8; NONCE_LEN + MAC_LEN] {
    let mut payload = [0u8; NONCE_LEN + MAC_LEN];
    payload[..NONCE_LEN].copy_from_slice(nonce);
    payload[NONCE_LEN..].copy_from_slice(mac);
    payload
}

pub fn sign_command(
    command: &str,
    timestamp: &str,
    vehicle_key: &str,
    private_key: &str,
) -> Result<String, CryptoError> {
    let key = keys::derive_shared_key(private_key, vehicle_key)?;
    let message = format!("{command}{timestamp}");
    Ok(HEXLOWER.encode(&keys::sign(&key[..], message.as_bytes())?))
}

/// Current Unix second as a decimal string
pub fn command_timestamp() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
        .to_string()
}

/// A command with the timestamp and tag the server verifies it against
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignedCommand {
    pub command: String,
    pub timestamp: String,
    pub hmac: String,
}

impl SignedCommand {
    /// Sign `command` at the current time
    pub fn new(command: &str, vehicle_key: &str, private_key: &str) -> Result<Self, CryptoError> {
        Self::at(command, command_timestamp(), vehicle_key, private_key)
    }

    pub fn at(
        command: &str,
        timestamp: String,
        vehicle_key: &str,
        private_key: &str,
    ) -> Result<Self, CryptoError> {
        let hmac = sign_command(command, &timestamp, vehicle_key, private_key)?;
        Ok(Self {
            command: command.to_string(),
            timestamp,
            hmac,
        })
    }
}
