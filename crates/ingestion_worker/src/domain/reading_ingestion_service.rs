use common::{
    decode_envelope, decode_reading, DomainError, DomainResult, EnvelopeDecryptor,
    MetricsRecorder, Reading, ReadingBroadcaster, LDR_INSTRUMENT, PIR_INSTRUMENT,
    SEALED_BOX_ALGORITHM,
};
use std::sync::Arc;
use tracing::{debug, error, info, info_span, instrument, warn, Instrument, Span};

/// Domain service that turns one encrypted transport message into a live reading
///
/// Flow:
/// 1. Decode the payload into an EncryptedEnvelope
/// 2. Decrypt the ciphertext
/// 3. Decode the plaintext into a Reading
/// 4. Record the ldr and pir gauges
/// 5. Hand the reading to the broadcaster
///
/// A failure at any step ends processing of that message only.
pub struct ReadingIngestionService {
    decryptor: Arc<dyn EnvelopeDecryptor>,
    metrics: Arc<dyn MetricsRecorder>,
    broadcaster: Arc<dyn ReadingBroadcaster>,
}

impl ReadingIngestionService {
    pub fn new(
        decryptor: Arc<dyn EnvelopeDecryptor>,
        metrics: Arc<dyn MetricsRecorder>,
        broadcaster: Arc<dyn ReadingBroadcaster>,
    ) -> Self {
        Self {
            decryptor,
            metrics,
            broadcaster,
        }
    }

    #[instrument(skip_all, fields(payload_size = payload.len(), device_id = tracing::field::Empty))]
    pub async fn process(&self, payload: &[u8]) -> DomainResult<Reading> {
        let envelope = decode_envelope(payload)?;

        if envelope.algorithm() != SEALED_BOX_ALGORITHM {
            debug!(algorithm = %envelope.algorithm(), "unexpected algorithm tag, attempting decrypt anyway");
        }
        if let Some(metrics) = &envelope.metrics {
            debug!(encrypt_time_ns = metrics.encrypt_time_ns, "sender reported encryption time");
        }

        let plaintext = self.decryptor.decrypt(
            &envelope.ciphertext,
            &envelope.nonce,
            envelope.ephemeral_public_key(),
        )?;

        let reading = decode_reading(&plaintext)?;
        Span::current().record("device_id", reading.device_id.as_str());

        self.metrics
            .record_gauge(LDR_INSTRUMENT, reading.illumination_value());
        self.metrics
            .record_gauge(PIR_INSTRUMENT, reading.motion_code());

        self.broadcaster.broadcast_reading(&reading).await?;

        debug!(device_id = %reading.device_id, "reading forwarded to hub");
        Ok(reading)
    }

    /// Transport delivery callback; every failure is logged and the message dropped
    ///
    /// Runs under a new root span so each message gets its own trace.
    pub async fn handle_message(&self, topic: &str, payload: &[u8]) {
        let span = info_span!(
            parent: Span::none(),
            "mqtt_message",
            topic = %topic,
            payload_size = payload.len(),
        );

        async {
            match self.process(payload).await {
                Ok(reading) => {
                    info!(
                        device_id = %reading.device_id,
                        timestamp_ms = reading.timestamp_ms,
                        ldr = reading.illumination,
                        pir = reading.motion_detected,
                        "reading ingested"
                    );
                }
                Err(e @ (DomainError::EnvelopeDecode(_) | DomainError::ReadingDecode(_))) => {
                    warn!(error = %e, "discarding malformed message");
                }
                Err(DomainError::Decrypt(e)) => {
                    warn!(error = %e, "discarding message that failed decryption");
                }
                Err(e) => {
                    error!(error = %e, "failed to ingest reading");
                }
            }
        }
        .instrument(span)
        .await
    }
}
