use crate::domain::{
    DecryptError, DomainError, DomainResult, EncryptedEnvelope, EnvelopeDecryptor,
    EnvelopeHeader, SEALED_BOX_ALGORITHM,
};
use ascon_aead::aead::{Aead, KeyInit};
use ascon_aead::{AsconAead128, AsconAead128Key, AsconAead128Nonce};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use hkdf::Hkdf;
use rand::rngs::OsRng;
use sha2::Sha256;
use std::fmt;
use std::sync::atomic::{AtomicU16, Ordering};
use x25519_dalek::{PublicKey, StaticSecret};

/// HKDF info string shared with the sensor firmware
const KDF_INFO: &[u8] = b"ascon-derive-v1";

/// Raw X25519 public key length
pub const PUBLIC_KEY_LEN: usize = 32;
/// Ascon-AEAD128 nonce length
pub const NONCE_LEN: usize = 16;
const ASCON_KEY_LEN: usize = 16;

/// Cipher and nonce seed derived from one X25519 exchange
struct DerivedParams {
    cipher: AsconAead128,
    nonce_seed: [u8; NONCE_LEN],
}

fn derive_params(secret: &StaticSecret, peer: &PublicKey) -> Result<DerivedParams, DecryptError> {
    let shared = secret.diffie_hellman(peer);

    let hkdf = Hkdf::<Sha256>::new(None, shared.as_bytes());
    let mut okm = [0u8; ASCON_KEY_LEN + NONCE_LEN];
    hkdf.expand(KDF_INFO, &mut okm)
        .map_err(|_| DecryptError::KeyDerivation)?;

    let cipher = AsconAead128::new(AsconAead128Key::from_slice(&okm[..ASCON_KEY_LEN]));
    let mut nonce_seed = [0u8; NONCE_LEN];
    nonce_seed.copy_from_slice(&okm[ASCON_KEY_LEN..]);

    Ok(DerivedParams { cipher, nonce_seed })
}

fn decode_base64(field: &'static str, value: &str) -> Result<Vec<u8>, DecryptError> {
    STANDARD
        .decode(value.trim())
        .map_err(|_| DecryptError::InvalidBase64 { field })
}

/// The server's static X25519 secret
#[derive(Clone)]
pub struct ServerSecret(StaticSecret);

impl ServerSecret {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(StaticSecret::from(bytes))
    }

    /// Parse a 64-character hex encoded secret
    pub fn from_hex(hex_key: &str) -> DomainResult<Self> {
        let bytes = hex::decode(hex_key.trim()).map_err(|e| {
            DomainError::InvalidConfig(format!("server private key is not valid hex: {}", e))
        })?;
        let bytes: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
            DomainError::InvalidConfig(format!(
                "server private key must be 32 bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self::from_bytes(bytes))
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey::from(&self.0)
    }
}

impl fmt::Debug for ServerSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ServerSecret").field(&"<redacted>").finish()
    }
}

/// Server-side [`EnvelopeDecryptor`] for X25519 + HKDF-SHA256 + Ascon-AEAD128 envelopes
#[derive(Debug, Clone)]
pub struct SealedBoxDecryptor {
    secret: ServerSecret,
}

impl SealedBoxDecryptor {
    pub fn new(secret: ServerSecret) -> Self {
        Self { secret }
    }
}

impl EnvelopeDecryptor for SealedBoxDecryptor {
    fn decrypt(
        &self,
        ciphertext: &str,
        nonce: &str,
        ephemeral_public_key: &str,
    ) -> Result<Vec<u8>, DecryptError> {
        let key_bytes = decode_base64("ephemeral_public_key", ephemeral_public_key)?;
        let key_bytes: [u8; PUBLIC_KEY_LEN] =
            key_bytes
                .as_slice()
                .try_into()
                .map_err(|_| DecryptError::InvalidKeyLength {
                    expected: PUBLIC_KEY_LEN,
                    actual: key_bytes.len(),
                })?;

        let nonce_bytes = decode_base64("nonce", nonce)?;
        if nonce_bytes.len() != NONCE_LEN {
            return Err(DecryptError::InvalidNonceLength {
                expected: NONCE_LEN,
                actual: nonce_bytes.len(),
            });
        }

        let ciphertext_bytes = decode_base64("ciphertext", ciphertext)?;

        let params = derive_params(&self.secret.0, &PublicKey::from(key_bytes))?;
        params
            .cipher
            .decrypt(
                AsconAead128Nonce::from_slice(&nonce_bytes),
                ciphertext_bytes.as_slice(),
            )
            .map_err(|_| DecryptError::Authentication)
    }
}

/// Sender side of the sealed box, mirroring the sensor firmware
///
/// Every envelope uses a fresh ephemeral secret. The nonce is 6 bytes of the
/// derived nonce seed, the 8-byte big-endian timestamp and a 2-byte
/// big-endian counter.
#[derive(Debug)]
pub struct SealedBoxSealer {
    server_public_key: PublicKey,
    counter: AtomicU16,
}

impl SealedBoxSealer {
    pub fn new(server_public_key: PublicKey) -> Self {
        Self {
            server_public_key,
            counter: AtomicU16::new(0),
        }
    }

    pub fn seal(&self, plaintext: &[u8], timestamp_ms: u64) -> DomainResult<EncryptedEnvelope> {
        let ephemeral = StaticSecret::random_from_rng(OsRng);
        let ephemeral_public_key = PublicKey::from(&ephemeral);

        let params = derive_params(&ephemeral, &self.server_public_key)?;
        let counter = self.counter.fetch_add(1, Ordering::Relaxed);
        let nonce = build_nonce(&params.nonce_seed, timestamp_ms, counter);

        let ciphertext = params
            .cipher
            .encrypt(AsconAead128Nonce::from_slice(&nonce), plaintext)
            .map_err(|_| DomainError::ReadingEncode("sealed box encryption failed".to_string()))?;

        Ok(EncryptedEnvelope {
            header: EnvelopeHeader {
                algorithm: SEALED_BOX_ALGORITHM.to_string(),
                ephemeral_public_key: STANDARD.encode(ephemeral_public_key.as_bytes()),
            },
            ciphertext: STANDARD.encode(ciphertext),
            nonce: STANDARD.encode(nonce),
            metrics: None,
        })
    }
}

fn build_nonce(seed: &[u8; NONCE_LEN], timestamp_ms: u64, counter: u16) -> [u8; NONCE_LEN] {
    let selector = ((timestamp_ms & 0xFF) as u8) ^ (((timestamp_ms >> 8) & 0xFF) as u8);
    // 16 - 6 + 1 start positions
    let start = selector as usize % 11;

    let mut nonce = [0u8; NONCE_LEN];
    nonce[0..6].copy_from_slice(&seed[start..start + 6]);
    nonce[6..14].copy_from_slice(&timestamp_ms.to_be_bytes());
    nonce[14..16].copy_from_slice(&counter.to_be_bytes());
    nonce
}
