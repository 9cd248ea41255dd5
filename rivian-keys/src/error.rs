#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("invalid private key: {0}")]
    InvalidPrivateKey(String),
    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),
    #[error("key derivation failed")]
    KeyDerivation,
    #[error("failed to encode key: {0}")]
    Encoding(String),
    #[error("invalid MAC key length")]
    Mac,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("Charging limit must include parameter `SOC_limit` with a valid value between 50 and 100")]
    ChargingLimit,
    #[error("HVAC setting must include parameter `level` with a valid value between 0 and 4")]
    HvacLevel,
    #[error(
        "HVAC setting must include parameter `HVAC_set_temp` with a valid value between 16 and 29 or 0/63.5 for LO/HI, respectively"
    )]
    HvacTemperature,
}
