use crate::domain::{DecryptError, DomainResult, Reading};
use async_trait::async_trait;

/// Instrument name for illumination observations
pub const LDR_INSTRUMENT: &str = "sensors.ldr";

/// Instrument name for 0/1-coded motion observations
pub const PIR_INSTRUMENT: &str = "sensors.pir";

/// Authenticated decryption of a sealed-box envelope
///
/// Implementations must be pure and thread-safe: no state is shared across
/// calls and a failure yields no partial plaintext.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait EnvelopeDecryptor: Send + Sync {
    /// Decrypt base64 `ciphertext` sealed for this server by the holder of
    /// the base64 `ephemeral_public_key`
    fn decrypt(
        &self,
        ciphertext: &str,
        nonce: &str,
        ephemeral_public_key: &str,
    ) -> Result<Vec<u8>, DecryptError>;
}

/// Sink for scalar observations tagged by instrument name
///
/// Fire-and-forget: implementations log their own failures and never
/// surface them to the caller.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait MetricsRecorder: Send + Sync {
    fn record_gauge(&self, instrument: &str, value: i64);
}

/// Fan-out of validated readings to live subscribers
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ReadingBroadcaster: Send + Sync {
    /// Hand a reading to the distribution hub
    ///
    /// # Returns
    /// () once the reading is queued for dispatch, DomainError if the hub is gone
    async fn broadcast_reading(&self, reading: &Reading) -> DomainResult<()>;
}
