//! P-256 key material, ECDH key agreement and HMAC-SHA256
//!
//! Key encodings match what the enrollment API exchanges:
//!
//! - public keys are lowercase hex of the 65-byte uncompressed SEC1 point
//! - private keys are Base64 of the PKCS#8 PEM document
//!
//! Nothing here holds state. The shared key is recomputed on every call
//! from the two long-lived keys and wiped when dropped.

use data_encoding::{BASE64, HEXLOWER, HEXLOWER_PERMISSIVE};
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::pkcs8::{DecodePrivateKey, EncodePrivateKey, LineEnding};
use p256::{PublicKey, SecretKey};
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::CryptoError;

type HmacSha256 = Hmac<Sha256>;

/// Length of the HKDF output used as the HMAC key
pub const SHARED_KEY_LEN: usize = 32;

/// Length of an HMAC-SHA256 tag
pub const MAC_LEN: usize = 32;

/// Symmetric key derived from a phone/vehicle key pair
pub type SharedKey = Zeroizing<[u8; SHARED_KEY_LEN]>;

/// A freshly generated phone key pair, in wire encoding
#[derive(Clone)]
pub struct KeyPair {
    pub public_key: String,
    pub private_key: Zeroizing<String>,
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &self.public_key)
            .finish_non_exhaustive()
    }
}

pub fn generate_key_pair() -> Result<KeyPair, CryptoError> {
    let secret = SecretKey::random(&mut rand::rngs::OsRng);
    Ok(KeyPair {
        public_key: encode_public_key(&secret.public_key()),
        private_key: encode_private_key(&secret)?,
    })
}

pub fn encode_public_key(public: &PublicKey) -> String {
    HEXLOWER.encode(public.to_encoded_point(false).as_bytes())
}

pub fn encode_private_key(secret: &SecretKey) -> Result<Zeroizing<String>, CryptoError> {
    let pem = secret
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| CryptoError::Encoding(e.to_string()))?;
    Ok(Zeroizing::new(BASE64.encode(pem.as_bytes())))
}

/// Accepts upper or lower case hex, compressed or uncompressed points.
pub fn decode_public_key(public_key: &str) -> Result<PublicKey, CryptoError> {
    let bytes = HEXLOWER_PERMISSIVE
        .decode(public_key.trim().as_bytes())
        .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))?;
    PublicKey::from_sec1_bytes(&bytes).map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))
}

pub fn decode_private_key(private_key: &str) -> Result<SecretKey, CryptoError> {
    let pem = BASE64
        .decode(private_key.trim().as_bytes())
        .map(Zeroizing::new)
        .map_err(|e| CryptoError::InvalidPrivateKey(e.to_string()))?;
    let pem = std::str::from_utf8(&pem)
        .map_err(|_| CryptoError::InvalidPrivateKey("PEM is not valid UTF-8".to_string()))?;
    SecretKey::from_pkcs8_pem(pem).map_err(|e| CryptoError::InvalidPrivateKey(e.to_string()))
}

/// ECDH between `private_key` and `public_key`, stretched with
/// HKDF-SHA256 (no salt, empty info) to 32 bytes.
///
/// Symmetric: `derive_shared_key(a.private, b.public)` equals
/// `derive_shared_key(b.private, a.public)`.
pub fn derive_shared_key(private_key: &str, public_key: &str) -> Result<SharedKey, CryptoError> {
    let secret = decode_private_key(private_key)?;
    let public = decode_public_key(public_key)?;

    let shared = p256::ecdh::diffie_hellman(secret.to_nonzero_scalar(), public.as_affine());
    let hkdf = Hkdf::<Sha256>::new(None, shared.raw_secret_bytes());

    let mut key = Zeroizing::new([0u8; SHARED_KEY_LEN]);
    hkdf.expand(&[], &mut key[..])
        .map_err(|_| CryptoError::KeyDerivation)?;
    Ok(key)
}

/// HMAC-SHA256 of `message` under `key`
pub fn sign(key: &[u8], message: &[u8]) -> Result<[u8; MAC_LEN], CryptoError> {
    let mut mac = HmacSha256::new_from_slice(key).map_err(|_| CryptoError::Mac)?;
    mac.update(message);
    Ok(mac.finalize().into_bytes().into())
}

/// Constant-time check of `tag` against HMAC-SHA256 of `message`
pub fn verify(key: &[u8], message: &[u8], tag: &[u8]) -> bool {
    match HmacSha256::new_from_slice(key) {
        Ok(mut mac) => {
            mac.update(message);
            mac.verify_slice(tag).is_ok()
        }
        Err(_) => false,
    }
}
