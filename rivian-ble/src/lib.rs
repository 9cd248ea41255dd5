//! BLE phone-key pairing with Rivian vehicles
//!
//! Scans for the vehicle's phone-key advertisement, exchanges identifiers,
//! proves possession of the enrolled key with an HMAC-signed nonce and then
//! has the OS bond with the vehicle.
//!
//! ```ignore
//! let request = PairingRequest { phone_id, vas_vehicle_id, vehicle_key, private_key };
//! if !pair_phone(&request, &PairingConfig::default()).await {
//!     // see the log for why
//! }
//! ```

mod bluez;
mod bonding;
pub mod btle;
mod error;
mod link;
mod pairing;

pub use bluez::set_bluez_pairable;
pub use bonding::BondingStrategy;
pub use error::PairingError;
pub use link::{GattLink, NotificationResponse};
pub use pairing::{
    PairingConfig, PairingRequest, PairingState, decode_identifier, normalize_identifier, pair_over_link,
    pair_phone, run_handshake, try_pair_phone,
};
