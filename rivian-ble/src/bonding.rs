use rivian_proto::ble::ACTIVE_ENTRY_CHARACTERISTIC_UUID;
use uuid::Uuid;

use crate::{GattLink, PairingError};

/// How the OS is made to bond with the vehicle after the nonce exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BondingStrategy {
    /// Subscribe to an encryption-protected characteristic; the OS bonds
    /// as a side effect. For stacks without a pairing API.
    ProtectedCharacteristic,
    /// Call the stack's pairing primitive directly
    ExplicitPair,
}

impl BondingStrategy {
    /// BlueZ exposes pairing; CoreBluetooth and WinRT (through btleplug)
    /// only bond on demand.
    pub const fn for_host() -> Self {
        if cfg!(target_os = "linux") {
            BondingStrategy::ExplicitPair
        } else {
            BondingStrategy::ProtectedCharacteristic
        }
    }

    pub async fn bond<L: GattLink + ?Sized>(self, link: &L) -> Result<(), PairingError> {
        match self {
            BondingStrategy::ProtectedCharacteristic => {
                let active_entry = Uuid::parse_str(ACTIVE_ENTRY_CHARACTERISTIC_UUID)
                    .map_err(|_| PairingError::InvalidIdentifier(ACTIVE_ENTRY_CHARACTERISTIC_UUID.to_string()))?;
                // the subscription completing is the bond; its notifications are unused
                link.start_notify(active_entry).await?;
                Ok(())
            }
            BondingStrategy::ExplicitPair => link.pair().await,
        }
    }
}
