use crate::domain::{DomainError, DomainResult, EncryptedEnvelope, Reading};

/// Decode a raw transport payload into an [`EncryptedEnvelope`]
///
/// Absent fields and empty cryptographic fields are decode failures, so the
/// decryptor is never invoked with something that cannot possibly succeed.
pub fn decode_envelope(payload: &[u8]) -> DomainResult<EncryptedEnvelope> {
    let envelope: EncryptedEnvelope = serde_json::from_slice(payload)
        .map_err(|e| DomainError::EnvelopeDecode(e.to_string()))?;

    let required = [
        ("header.ephemeral_public_key", envelope.ephemeral_public_key()),
        ("ciphertext", envelope.ciphertext.as_str()),
        ("nonce", envelope.nonce.as_str()),
    ];
    for (field, value) in required {
        if value.trim().is_empty() {
            return Err(DomainError::EnvelopeDecode(format!(
                "{} cannot be empty",
                field
            )));
        }
    }

    Ok(envelope)
}

/// Decode decrypted plaintext into a [`Reading`]
pub fn decode_reading(plaintext: &[u8]) -> DomainResult<Reading> {
    serde_json::from_slice(plaintext).map_err(|e| DomainError::ReadingDecode(e.to_string()))
}

/// Encode a [`Reading`] in the decrypted-payload wire format
pub fn encode_reading(reading: &Reading) -> DomainResult<String> {
    serde_json::to_string(reading).map_err(|e| DomainError::ReadingEncode(e.to_string()))
}
