//! btleplug-backed [`GattLink`]

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{Central, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::StreamExt;
use rivian_proto::ble::PHONE_KEY_LOCAL_NAME;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::{GattLink, NotificationResponse, PairingError, PairingState, bluez};

const SCAN_POLL_INTERVAL: Duration = Duration::from_millis(250);

type Pending = Arc<Mutex<HashMap<Uuid, oneshot::Sender<Vec<u8>>>>>;

/// Get the default Bluetooth adapter
pub async fn get_adapter() -> Result<Adapter, PairingError> {
    let manager = Manager::new().await?;
    let adapters = manager.adapters().await?;
    adapters.into_iter().next().ok_or(PairingError::NoAdapter)
}

/// Scan until a peripheral advertises the phone-key local name
pub async fn find_phone_key(adapter: &Adapter, scan_timeout: Duration) -> Result<Peripheral, PairingError> {
    adapter.start_scan(ScanFilter::default()).await?;

    let found = tokio::time::timeout(scan_timeout, async {
        loop {
            for peripheral in adapter.peripherals().await? {
                if let Some(props) = peripheral.properties().await? {
                    if props.local_name.as_deref() == Some(PHONE_KEY_LOCAL_NAME) {
                        return Ok::<_, PairingError>(peripheral);
                    }
                }
            }
            tokio::time::sleep(SCAN_POLL_INTERVAL).await;
        }
    })
    .await;

    if let Err(e) = adapter.stop_scan().await {
        log::debug!("Failed to stop scan: {}", e);
    }
    match found {
        Ok(peripheral) => peripheral,
        Err(_) => Err(PairingError::DeviceNotFound(PHONE_KEY_LOCAL_NAME)),
    }
}

/// A failed setup step must not leave the peripheral connected
async fn disconnect_on_error<T, D>(result: Result<T, PairingError>, disconnect: D) -> Result<T, PairingError>
where
    D: Future<Output = Result<(), btleplug::Error>>,
{
    if result.is_err() {
        if let Err(e) = disconnect.await {
            log::debug!("Disconnect after failed setup failed: {}", e);
        }
    }
    result
}

fn lock(pending: &Pending) -> MutexGuard<'_, HashMap<Uuid, oneshot::Sender<Vec<u8>>>> {
    pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A connected peripheral.
///
/// One task drains the peripheral's notification stream and hands each
/// value to whoever armed a response for that characteristic.
pub struct BtleLink {
    peripheral: Peripheral,
    pending: Pending,
    router: JoinHandle<()>,
}

impl BtleLink {
    pub async fn connect(peripheral: Peripheral, connect_timeout: Duration) -> Result<Self, PairingError> {
        tokio::time::timeout(connect_timeout, peripheral.connect())
            .await
            .map_err(|_| PairingError::Timeout {
                step: PairingState::Scanning,
            })??;
        let setup = async {
            peripheral.discover_services().await?;
            Ok::<_, PairingError>(peripheral.notifications().await?)
        };
        let mut notifications = disconnect_on_error(setup.await, peripheral.disconnect()).await?;
        log::debug!("Connected to {}", peripheral.address());

        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let router = tokio::spawn({
            let pending = Arc::clone(&pending);
            async move {
                while let Some(notification) = notifications.next().await {
                    let waiter = lock(&pending).remove(&notification.uuid);
                    match waiter {
                        Some(tx) => {
                            let _ = tx.send(notification.value);
                        }
                        None => log::trace!("Unclaimed notification on {}", notification.uuid),
                    }
                }
            }
        });

        Ok(Self {
            peripheral,
            pending,
            router,
        })
    }

    fn characteristic(&self, uuid: Uuid) -> Result<Characteristic, PairingError> {
        self.peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == uuid)
            .ok_or(PairingError::CharacteristicNotFound(uuid))
    }
}

impl Drop for BtleLink {
    fn drop(&mut self) {
        self.router.abort();
    }
}

#[async_trait]
impl GattLink for BtleLink {
    async fn start_notify(&self, characteristic: Uuid) -> Result<NotificationResponse, PairingError> {
        let target = self.characteristic(characteristic)?;
        let (tx, response) = NotificationResponse::channel();
        lock(&self.pending).insert(characteristic, tx);
        if let Err(e) = self.peripheral.subscribe(&target).await {
            lock(&self.pending).remove(&characteristic);
            return Err(e.into());
        }
        Ok(response)
    }

    async fn write(&self, characteristic: Uuid, data: &[u8]) -> Result<(), PairingError> {
        let target = self.characteristic(characteristic)?;
        self.peripheral.write(&target, data, WriteType::WithResponse).await?;
        Ok(())
    }

    async fn pair(&self) -> Result<(), PairingError> {
        bluez::pair_device(&self.peripheral.address().to_string()).await
    }

    async fn disconnect(&self) -> Result<(), PairingError> {
        self.peripheral.disconnect().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    async fn mark(flag: &AtomicBool) -> Result<(), btleplug::Error> {
        flag.store(true, Ordering::SeqCst);
        Ok(())
    }

    #[tokio::test]
    async fn failed_setup_disconnects() {
        let disconnected = AtomicBool::new(false);
        let result: Result<(), _> =
            disconnect_on_error(Err(PairingError::NotificationClosed), mark(&disconnected)).await;

        assert!(matches!(result, Err(PairingError::NotificationClosed)));
        assert!(disconnected.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn successful_setup_stays_connected() {
        let disconnected = AtomicBool::new(false);
        let result = disconnect_on_error(Ok(7), mark(&disconnected)).await;

        assert_eq!(result.unwrap(), 7);
        assert!(!disconnected.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn disconnect_failure_keeps_the_setup_error() {
        let result: Result<(), _> = disconnect_on_error(
            Err(PairingError::CharacteristicNotFound(Uuid::nil())),
            async { Err(btleplug::Error::NotConnected) },
        )
        .await;

        assert!(matches!(result, Err(PairingError::CharacteristicNotFound(_))));
    }
}
