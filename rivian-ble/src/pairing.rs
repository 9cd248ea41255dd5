//! Phone-key pairing handshake.
//!
//! The phone advertises itself to the vehicle by writing its identifier,
//! the vehicle answers with its own, and the phone then proves possession
//! of the enrolled key by sending a nonce with an HMAC over it. Only after
//! that does the OS bond with the vehicle.

use std::fmt;
use std::time::Duration;

use data_encoding::{HEXLOWER, HEXLOWER_PERMISSIVE};
use rivian_keys::signer::{generate_nonce, pairing_payload};
use rivian_keys::sign_ble_nonce;
use rivian_proto::ble::{IDENTIFIER_LEN, PHONE_ID_VEHICLE_ID_UUID, PHONE_NONCE_VEHICLE_NONCE_UUID};
use uuid::Uuid;

use crate::{BondingStrategy, GattLink, PairingError, btle};

/// Where a pairing attempt got to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairingState {
    Scanning,
    Connected,
    IdentityExchanged,
    NonceExchanged,
    Bonded,
    Failed,
}

impl fmt::Display for PairingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PairingState::Scanning => "scanning",
            PairingState::Connected => "connected",
            PairingState::IdentityExchanged => "identity exchange",
            PairingState::NonceExchanged => "nonce exchange",
            PairingState::Bonded => "bonded",
            PairingState::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct PairingConfig {
    /// How long to look for the phone-key advertisement
    pub scan_timeout: Duration,
    pub connect_timeout: Duration,
    /// How long the vehicle gets to answer each write
    pub notification_timeout: Duration,
}

impl Default for PairingConfig {
    fn default() -> Self {
        Self {
            scan_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(10),
            notification_timeout: Duration::from_secs(3),
        }
    }
}

/// What the account API returned when the phone was enrolled
#[derive(Clone)]
pub struct PairingRequest {
    /// Phone identifier, hex with optional dashes
    pub phone_id: String,
    /// Vehicle identifier as the account API reports it
    pub vas_vehicle_id: String,
    /// Vehicle public key, hex SEC1
    pub vehicle_key: String,
    /// Phone private key, base64 of its PKCS#8 PEM
    pub private_key: String,
}

impl fmt::Debug for PairingRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PairingRequest")
            .field("phone_id", &self.phone_id)
            .field("vas_vehicle_id", &self.vas_vehicle_id)
            .field("vehicle_key", &self.vehicle_key)
            .finish_non_exhaustive()
    }
}

/// Lowercase hex with dashes removed
pub fn normalize_identifier(id: &str) -> String {
    id.chars()
        .filter(|c| *c != '-')
        .flat_map(char::to_lowercase)
        .collect()
}

/// The identifier's 16 raw bytes, as written to the vehicle
pub fn decode_identifier(id: &str) -> Result<[u8; IDENTIFIER_LEN], PairingError> {
    let invalid = || PairingError::InvalidIdentifier(id.to_string());
    let bytes = HEXLOWER_PERMISSIVE
        .decode(normalize_identifier(id).as_bytes())
        .map_err(|_| invalid())?;
    bytes.try_into().map_err(|_| invalid())
}

fn characteristic(uuid: &str) -> Result<Uuid, PairingError> {
    Uuid::parse_str(uuid).map_err(|_| PairingError::InvalidIdentifier(uuid.to_string()))
}

fn advance(state: &mut PairingState, next: PairingState) {
    log::debug!("Pairing: {} -> {}", state, next);
    *state = next;
}

/// Run the handshake over an already connected link.
///
/// Both response notifications are armed before the first write so that
/// a fast vehicle cannot answer into the void.
pub async fn run_handshake<L: GattLink + ?Sized>(
    link: &L,
    request: &PairingRequest,
    bonding: BondingStrategy,
    config: &PairingConfig,
) -> Result<(), PairingError> {
    let mut state = PairingState::Connected;
    let result = handshake(link, request, bonding, config, &mut state).await;
    if let Err(e) = &result {
        log::warn!("Pairing failed during {}: {}", state, e);
        advance(&mut state, PairingState::Failed);
    }
    result
}

async fn handshake<L: GattLink + ?Sized>(
    link: &L,
    request: &PairingRequest,
    bonding: BondingStrategy,
    config: &PairingConfig,
    state: &mut PairingState,
) -> Result<(), PairingError> {
    let identity = characteristic(PHONE_ID_VEHICLE_ID_UUID)?;
    let nonce_exchange = characteristic(PHONE_NONCE_VEHICLE_NONCE_UUID)?;
    let phone_id = decode_identifier(&request.phone_id)?;

    let vehicle_id = link.start_notify(identity).await?;
    let vehicle_nonce = link.start_notify(nonce_exchange).await?;

    link.write(identity, &phone_id).await?;
    let received = vehicle_id.wait(*state, config.notification_timeout).await?;

    let received = HEXLOWER.encode(&received);
    let expected = normalize_identifier(&request.vas_vehicle_id);
    if received != expected {
        return Err(PairingError::IdentityMismatch { expected, received });
    }
    advance(state, PairingState::IdentityExchanged);

    let nonce = generate_nonce();
    let mac = sign_ble_nonce(&nonce, &request.vehicle_key, &request.private_key)?;
    link.write(nonce_exchange, &pairing_payload(&nonce, &mac)).await?;
    vehicle_nonce.wait(*state, config.notification_timeout).await?;
    advance(state, PairingState::NonceExchanged);

    bonding.bond(link).await?;
    advance(state, PairingState::Bonded);
    Ok(())
}

/// Handshake over a caller-supplied link, reporting only success
pub async fn pair_over_link<L: GattLink + ?Sized>(
    link: &L,
    request: &PairingRequest,
    bonding: BondingStrategy,
    config: &PairingConfig,
) -> bool {
    run_handshake(link, request, bonding, config).await.is_ok()
}

/// Find the advertising phone key, connect and pair with it
pub async fn try_pair_phone(request: &PairingRequest, config: &PairingConfig) -> Result<(), PairingError> {
    decode_identifier(&request.phone_id)?;

    log::debug!("Pairing: scanning for the phone key");
    let adapter = btle::get_adapter().await?;
    let peripheral = btle::find_phone_key(&adapter, config.scan_timeout).await?;
    let link = btle::BtleLink::connect(peripheral, config.connect_timeout).await?;

    let result = run_handshake(&link, request, BondingStrategy::for_host(), config).await;
    if let Err(e) = link.disconnect().await {
        log::debug!("Disconnect after pairing failed: {}", e);
    }
    result
}

/// [`try_pair_phone`], with failures logged rather than returned
pub async fn pair_phone(request: &PairingRequest, config: &PairingConfig) -> bool {
    match try_pair_phone(request, config).await {
        Ok(()) => {
            log::info!("Paired with vehicle {}", request.vas_vehicle_id);
            true
        }
        Err(e) => {
            log::error!("Pairing with vehicle {} failed: {}", request.vas_vehicle_id, e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NotificationResponse;
    use async_trait::async_trait;
    use rivian_keys::generate_key_pair;
    use rivian_keys::keys::MAC_LEN;
    use rivian_keys::signer::NONCE_LEN;
    use rivian_proto::ble::ACTIVE_ENTRY_CHARACTERISTIC_UUID;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tokio::sync::oneshot;

    const PHONE_ID: &str = "0123abcd-4567-89ef-0123-456789abcdef";
    const VEHICLE_ID: [u8; 16] = [
        0xfe, 0xdc, 0xba, 0x98, 0x76, 0x54, 0x32, 0x10, 0x0f, 0x1e, 0x2d, 0x3c, 0x4b, 0x5a, 0x69, 0x78,
    ];

    #[derive(Debug, Clone, PartialEq)]
    enum Event {
        Notify(Uuid),
        Write(Uuid, Vec<u8>),
        Pair,
    }

    /// A vehicle that answers the identity write with `vehicle_id` and,
    /// if `answers_nonce`, acknowledges the nonce write.
    struct MockVehicle {
        vehicle_id: Vec<u8>,
        answers_nonce: bool,
        events: Mutex<Vec<Event>>,
        pending: Mutex<HashMap<Uuid, oneshot::Sender<Vec<u8>>>>,
    }

    impl MockVehicle {
        fn new(vehicle_id: &[u8], answers_nonce: bool) -> Self {
            Self {
                vehicle_id: vehicle_id.to_vec(),
                answers_nonce,
                events: Mutex::new(Vec::new()),
                pending: Mutex::new(HashMap::new()),
            }
        }

        fn events(&self) -> Vec<Event> {
            self.events.lock().unwrap().clone()
        }

        fn notify(&self, uuid: Uuid, value: Vec<u8>) {
            if let Some(tx) = self.pending.lock().unwrap().remove(&uuid) {
                let _ = tx.send(value);
            }
        }
    }

    #[async_trait]
    impl GattLink for MockVehicle {
        async fn start_notify(&self, characteristic: Uuid) -> Result<NotificationResponse, PairingError> {
            self.events.lock().unwrap().push(Event::Notify(characteristic));
            let (tx, response) = NotificationResponse::channel();
            self.pending.lock().unwrap().insert(characteristic, tx);
            Ok(response)
        }

        async fn write(&self, characteristic: Uuid, data: &[u8]) -> Result<(), PairingError> {
            self.events
                .lock()
                .unwrap()
                .push(Event::Write(characteristic, data.to_vec()));
            if characteristic == uuid(PHONE_ID_VEHICLE_ID_UUID) {
                self.notify(characteristic, self.vehicle_id.clone());
            } else if characteristic == uuid(PHONE_NONCE_VEHICLE_NONCE_UUID) && self.answers_nonce {
                self.notify(characteristic, vec![0; NONCE_LEN]);
            }
            Ok(())
        }

        async fn pair(&self) -> Result<(), PairingError> {
            self.events.lock().unwrap().push(Event::Pair);
            Ok(())
        }

        async fn disconnect(&self) -> Result<(), PairingError> {
            Ok(())
        }
    }

    fn uuid(s: &str) -> Uuid {
        Uuid::parse_str(s).unwrap()
    }

    struct Keys {
        request: PairingRequest,
        vehicle_key: String,
        private_key: String,
    }

    fn request() -> Keys {
        let phone = generate_key_pair().unwrap();
        let vehicle = generate_key_pair().unwrap();
        let request = PairingRequest {
            phone_id: PHONE_ID.to_string(),
            vas_vehicle_id: "FEDCBA98-7654-3210-0F1E-2D3C4B5A6978".to_string(),
            vehicle_key: vehicle.public_key.clone(),
            private_key: phone.private_key.to_string(),
        };
        Keys {
            request,
            vehicle_key: vehicle.public_key,
            private_key: phone.private_key.to_string(),
        }
    }

    fn config() -> PairingConfig {
        let _ = env_logger::builder().is_test(true).try_init();
        PairingConfig {
            notification_timeout: Duration::from_millis(50),
            ..PairingConfig::default()
        }
    }

    #[tokio::test]
    async fn handshake_arms_notifications_before_writing() {
        let keys = request();
        let vehicle = MockVehicle::new(&VEHICLE_ID, true);

        run_handshake(&vehicle, &keys.request, BondingStrategy::ExplicitPair, &config())
            .await
            .unwrap();

        let events = vehicle.events();
        assert_eq!(events[0], Event::Notify(uuid(PHONE_ID_VEHICLE_ID_UUID)));
        assert_eq!(events[1], Event::Notify(uuid(PHONE_NONCE_VEHICLE_NONCE_UUID)));
        assert_eq!(
            events[2],
            Event::Write(uuid(PHONE_ID_VEHICLE_ID_UUID), decode_identifier(PHONE_ID).unwrap().to_vec())
        );
        assert_eq!(events.last(), Some(&Event::Pair));
    }

    #[tokio::test]
    async fn nonce_payload_carries_its_own_mac() {
        let keys = request();
        let vehicle = MockVehicle::new(&VEHICLE_ID, true);

        run_handshake(&vehicle, &keys.request, BondingStrategy::ExplicitPair, &config())
            .await
            .unwrap();

        let payload = vehicle
            .events()
            .into_iter()
            .find_map(|e| match e {
                Event::Write(c, data) if c == uuid(PHONE_NONCE_VEHICLE_NONCE_UUID) => Some(data),
                _ => None,
            })
            .expect("nonce was never written");
        assert_eq!(payload.len(), NONCE_LEN + MAC_LEN);

        let nonce: [u8; NONCE_LEN] = payload[..NONCE_LEN].try_into().unwrap();
        let mac = sign_ble_nonce(&nonce, &keys.vehicle_key, &keys.private_key).unwrap();
        assert_eq!(&payload[NONCE_LEN..], &mac[..]);
    }

    #[tokio::test]
    async fn identity_mismatch_stops_before_the_nonce() {
        let keys = request();
        let mut other = VEHICLE_ID;
        other[0] ^= 0xff;
        let vehicle = MockVehicle::new(&other, true);

        let err = run_handshake(&vehicle, &keys.request, BondingStrategy::ExplicitPair, &config())
            .await
            .unwrap_err();

        match err {
            PairingError::IdentityMismatch { expected, received } => {
                assert_eq!(expected, "fedcba98765432100f1e2d3c4b5a6978");
                assert_eq!(received, HEXLOWER.encode(&other));
            }
            other => panic!("unexpected error: {other}"),
        }
        let nonce_writes = vehicle
            .events()
            .iter()
            .filter(|e| matches!(e, Event::Write(c, _) if *c == uuid(PHONE_NONCE_VEHICLE_NONCE_UUID)))
            .count();
        assert_eq!(nonce_writes, 0);
        assert!(!vehicle.events().contains(&Event::Pair));
    }

    #[tokio::test]
    async fn silent_vehicle_times_out_without_bonding() {
        let keys = request();
        let vehicle = MockVehicle::new(&VEHICLE_ID, false);

        let err = run_handshake(&vehicle, &keys.request, BondingStrategy::ExplicitPair, &config())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PairingError::Timeout { step: PairingState::IdentityExchanged }
        ));
        assert!(!vehicle.events().contains(&Event::Pair));
        assert!(!pair_over_link(&vehicle, &keys.request, BondingStrategy::ExplicitPair, &config()).await);
    }

    #[tokio::test]
    async fn protected_characteristic_bonds_by_subscribing() {
        let keys = request();
        let vehicle = MockVehicle::new(&VEHICLE_ID, true);

        assert!(
            pair_over_link(&vehicle, &keys.request, BondingStrategy::ProtectedCharacteristic, &config()).await
        );

        let events = vehicle.events();
        assert_eq!(
            events.last(),
            Some(&Event::Notify(uuid(ACTIVE_ENTRY_CHARACTERISTIC_UUID)))
        );
        assert!(!events.contains(&Event::Pair));
    }

    #[tokio::test]
    async fn bad_phone_id_touches_nothing() {
        let mut keys = request();
        keys.request.phone_id = "not-hex".to_string();
        let vehicle = MockVehicle::new(&VEHICLE_ID, true);

        let err = run_handshake(&vehicle, &keys.request, BondingStrategy::ExplicitPair, &config())
            .await
            .unwrap_err();

        assert!(matches!(err, PairingError::InvalidIdentifier(_)));
        assert!(vehicle.events().is_empty());
    }

    #[test]
    fn identifiers_ignore_dashes_and_case() {
        assert_eq!(
            normalize_identifier("FEDCBA98-7654-3210-0F1E-2D3C4B5A6978"),
            "fedcba98765432100f1e2d3c4b5a6978"
        );
        assert_eq!(
            decode_identifier("FEDCBA98-7654-3210-0F1E-2D3C4B5A6978").unwrap(),
            VEHICLE_ID
        );
    }

    #[test]
    fn identifiers_must_be_sixteen_bytes() {
        assert!(decode_identifier("0123abcd").is_err());
        assert!(decode_identifier(&"00".repeat(17)).is_err());
        assert!(decode_identifier("zz23abcd456789ef0123456789abcdef").is_err());
    }
}
