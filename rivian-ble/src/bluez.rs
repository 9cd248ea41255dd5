//! Direct BlueZ access for what btleplug does not expose

use crate::PairingError;

#[cfg(target_os = "linux")]
impl From<bluer::Error> for PairingError {
    fn from(e: bluer::Error) -> Self {
        PairingError::Bluez(e.to_string())
    }
}

#[cfg(target_os = "linux")]
async fn default_adapter() -> Result<bluer::Adapter, PairingError> {
    let session = bluer::Session::new().await?;
    Ok(session.default_adapter().await?)
}

/// Make the default adapter accept pairing requests.
///
/// BlueZ refuses incoming bonds on a non-pairable adapter, which makes
/// the vehicle drop the connection after the nonce exchange.
#[cfg(target_os = "linux")]
pub async fn set_bluez_pairable() -> Result<(), PairingError> {
    let adapter = default_adapter().await?;
    if !adapter.is_pairable().await? {
        log::info!("Making adapter {} pairable", adapter.name());
        adapter.set_pairable(true).await?;
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
pub async fn set_bluez_pairable() -> Result<(), PairingError> {
    Err(PairingError::Unsupported("BlueZ"))
}

#[cfg(target_os = "linux")]
pub(crate) async fn pair_device(address: &str) -> Result<(), PairingError> {
    let address: bluer::Address = address
        .parse()
        .map_err(|_| PairingError::InvalidIdentifier(address.to_string()))?;
    let device = default_adapter().await?.device(address)?;
    if device.is_paired().await? {
        log::debug!("{} is already paired", address);
        return Ok(());
    }
    device.pair().await?;
    Ok(())
}

#[cfg(not(target_os = "linux"))]
pub(crate) async fn pair_device(_address: &str) -> Result<(), PairingError> {
    Err(PairingError::Unsupported("explicit pairing"))
}
