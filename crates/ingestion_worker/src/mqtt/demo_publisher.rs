use crate::mqtt::parse_broker_url;
use common::crypto::SealedBoxSealer;
use common::{encode_reading, DomainError, DomainResult, Reading};
use rand::Rng;
use rumqttc::{AsyncClient, MqttOptions, QoS};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Upper bound of the simulated 12-bit ADC
const LDR_RANGE: u64 = 4096;
const CONNECTION_RETRY_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct DemoPublisherConfig {
    pub broker_url: String,
    pub client_id: String,
    pub topic: String,
    pub device_id: String,
    pub interval: Duration,
}

/// Build a synthetic reading: random illumination, motion toggling every sample
pub fn synthetic_reading(device_id: &str, sequence: u64, timestamp_ms: u64) -> Reading {
    Reading {
        device_id: device_id.to_string(),
        timestamp_ms,
        illumination: rand::thread_rng().gen_range(0..LDR_RANGE),
        motion_detected: sequence % 2 == 1,
    }
}

/// Seal `reading` for the server and encode the envelope for the wire
pub fn seal_reading(sealer: &SealedBoxSealer, reading: &Reading) -> DomainResult<Vec<u8>> {
    let plaintext = encode_reading(reading)?;
    let envelope = sealer.seal(plaintext.as_bytes(), reading.timestamp_ms)?;
    serde_json::to_vec(&envelope).map_err(|e| DomainError::ReadingEncode(e.to_string()))
}

fn now_ms() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or_default()
}

/// Publish a sealed synthetic reading every `interval` until cancelled
#[instrument(name = "demo_publisher", skip_all, fields(device_id = %config.device_id, topic = %config.topic))]
pub async fn run_demo_publisher(
    config: DemoPublisherConfig,
    sealer: Arc<SealedBoxSealer>,
    token: CancellationToken,
) -> anyhow::Result<()> {
    let (host, port) = parse_broker_url(&config.broker_url)?;

    let mut mqtt_options = MqttOptions::new(&config.client_id, host, port);
    mqtt_options.set_keep_alive(Duration::from_secs(30));
    let (client, mut eventloop) = AsyncClient::new(mqtt_options, 10);

    let mut ticker = tokio::time::interval(config.interval);
    let mut sequence: u64 = 0;

    info!(interval_ms = config.interval.as_millis() as u64, "starting demo publisher");

    loop {
        tokio::select! {
            _ = token.cancelled() => {
                let _ = client.try_disconnect();
                break;
            }
            _ = ticker.tick() => {
                let reading = synthetic_reading(&config.device_id, sequence, now_ms());
                sequence = sequence.wrapping_add(1);

                match seal_reading(&sealer, &reading) {
                    Ok(payload) => {
                        if let Err(e) = client.try_publish(&config.topic, QoS::AtMostOnce, false, payload) {
                            warn!(error = %e, "failed to queue demo reading");
                        } else {
                            debug!(ldr = reading.illumination, pir = reading.motion_detected, "demo reading queued");
                        }
                    }
                    Err(e) => warn!(error = %e, "failed to seal demo reading"),
                }
            }
            event = eventloop.poll() => {
                if let Err(e) = event {
                    warn!(error = %e, "demo publisher connection error");
                    tokio::select! {
                        _ = token.cancelled() => break,
                        _ = tokio::time::sleep(CONNECTION_RETRY_DELAY) => {}
                    }
                }
            }
        }
    }

    info!("demo publisher stopped");
    Ok(())
}
