//! Rivian vehicle cloud and phone-key client
//!
//! Ties the pieces together: a [`Rivian`] session keeps live GraphQL
//! subscriptions to the gateway, [`signed_command`] prepares vehicle
//! commands, and with the `ble` feature [`ble::pair_phone`] enrolls the
//! phone as a key over Bluetooth.
//!
//! # Example
//!
//! ```ignore
//! use rivian::{ClientConfig, Rivian, json, sync_callback};
//!
//! let rivian = Rivian::new(ClientConfig::load("rivian.json")?, user_session_token);
//! let _handle = rivian
//!     .subscribe(
//!         json!({"query": VEHICLE_STATE, "variables": {"vehicleID": vehicle_id}}),
//!         sync_callback(|frame| log::info!("{}", frame["payload"])),
//!     )
//!     .await?;
//! ```

mod client;
mod config;
mod error;

pub use client::{Rivian, signed_command};
pub use config::{
    ClientConfig, ConfigError, DEFAULT_CLIENT_NAME, DEFAULT_CLIENT_VERSION, connection_init_payload,
};
pub use error::Error;

pub use rivian_keys::{KeyPair, SignedCommand, VehicleCommand, generate_key_pair};
pub use rivian_monitor::{
    Callback, ConnectionState, MonitorConfig, SubscriptionHandle, Supervisor, callback, sync_callback,
};
pub use rivian_proto as proto;
pub use serde_json::{Value as JsonValue, json};

#[cfg(feature = "ble")]
pub use rivian_ble as ble;
