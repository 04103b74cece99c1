use thiserror::Error;

pub type DomainResult<T> = Result<T, DomainError>;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Envelope decode error: {0}")]
    EnvelopeDecode(String),

    #[error("Reading decode error: {0}")]
    ReadingDecode(String),

    #[error("Reading encode error: {0}")]
    ReadingEncode(String),

    #[error("Decrypt error: {0}")]
    Decrypt(#[from] DecryptError),

    #[error("Broadcast error: {0}")]
    Broadcast(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Transport error: {0}")]
    Transport(#[from] anyhow::Error),
}

/// Failure modes of the envelope decryption primitive.
///
/// None of these are retryable: the same ciphertext, nonce and key always
/// produce the same outcome.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecryptError {
    #[error("invalid base64 in {field}")]
    InvalidBase64 { field: &'static str },

    #[error("ephemeral public key must be {expected} bytes, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("nonce must be {expected} bytes, got {actual}")]
    InvalidNonceLength { expected: usize, actual: usize },

    #[error("key derivation failed")]
    KeyDerivation,

    #[error("ciphertext failed authentication")]
    Authentication,
}
