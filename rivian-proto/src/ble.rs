//! BLE GATT constants for Rivian phone-key pairing
//!
//! The vehicle exposes the phone-key service under a fixed advertised
//! name. Pairing uses two characteristics: the phone writes its id to the
//! identity characteristic and the vehicle notifies its own id back; the
//! phone then writes `nonce || HMAC(nonce)` to the nonce characteristic
//! and the vehicle acknowledges with a notification.

/// Advertised local name of the vehicle's phone-key peripheral
pub const PHONE_KEY_LOCAL_NAME: &str = "Rivian Phone Key";

/// Identity characteristic (write + notify): phone id out, vehicle id back
pub const PHONE_ID_VEHICLE_ID_UUID: &str = "aa49565a-4d4f-424b-4559-5f5752495445";

/// Nonce characteristic (notify + write): phone writes `nonce || hmac`
pub const PHONE_NONCE_VEHICLE_NONCE_UUID: &str = "e020a15d-e730-4b2c-908b-51daf9d41e19";

/// Encryption-protected characteristic; subscribing to it triggers OS bonding
pub const ACTIVE_ENTRY_CHARACTERISTIC_UUID: &str = "5249565f-4d4f-424b-4559-5f5752495445";

/// Bytes in a phone or vehicle identifier
pub const IDENTIFIER_LEN: usize = 16;
