//! Rivian key material and command signing
//!
//! The phone and the vehicle each hold a P-256 key pair. Both sides derive
//! the same 32-byte HMAC key with ECDH followed by HKDF-SHA256, so a tag
//! computed on the phone can be checked by the vehicle without any secret
//! ever crossing the wire.
//!
//! # Example
//!
//! ```ignore
//! use rivian_keys::{generate_key_pair, signer};
//!
//! let phone = generate_key_pair()?;
//! // phone.public_key is sent during enrollment, phone.private_key is kept
//!
//! let signed = signer::SignedCommand::new("WAKE_VEHICLE", &vehicle_public_key, &phone.private_key)?;
//! ```

pub mod command;
mod error;
pub mod keys;
pub mod signer;

pub use command::{VehicleCommand, validate_params};
pub use error::{CommandError, CryptoError};
pub use keys::{KeyPair, SharedKey, derive_shared_key, generate_key_pair, sign, verify};
pub use signer::{SignedCommand, sign_ble_nonce, sign_command};
