use serde::{Deserialize, Serialize};

/// Algorithm tag stamped on envelopes produced by the sensor firmware
pub const SEALED_BOX_ALGORITHM: &str = "X25519+HKDF-SHA256+ASCON128";

/// Wire-level encrypted unit published by a sensor
///
/// ```json
/// {"header": {"algorithm": "...", "ephemeral_public_key": "..."}, "ciphertext": "...", "nonce": "..."}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedEnvelope {
    pub header: EnvelopeHeader,
    /// Base64 ciphertext including the AEAD tag
    pub ciphertext: String,
    /// Base64 nonce
    pub nonce: String,
    /// Sender-side timing, informational only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<EnvelopeMetrics>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeHeader {
    pub algorithm: String,
    /// Base64 X25519 public key of the sender's ephemeral secret
    pub ephemeral_public_key: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeMetrics {
    pub encrypt_time_ns: u64,
}

impl EncryptedEnvelope {
    pub fn algorithm(&self) -> &str {
        &self.header.algorithm
    }

    pub fn ephemeral_public_key(&self) -> &str {
        &self.header.ephemeral_public_key
    }
}
