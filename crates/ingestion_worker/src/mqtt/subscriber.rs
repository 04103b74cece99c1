use crate::domain::ReadingIngestionService;
use crate::mqtt::{parse_broker_url, ReconnectBackoff};
use common::{DomainError, DomainResult};
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// rumqttc rejects keep-alive intervals below this
const MIN_KEEP_ALIVE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct MqttSubscriberConfig {
    pub broker_url: String,
    pub client_id: String,
    pub topic: String,
    pub keep_alive: Duration,
    pub reconnect: ReconnectBackoff,
}

/// Run the MQTT subscriber until `token` is cancelled
///
/// Subscribes to the configured topic at QoS 0 and hands every publish to the
/// ingestion service. Connection failures are retried without limit using
/// capped exponential backoff; a successful ConnAck resets the backoff.
/// Only an unparseable broker URL is fatal.
#[instrument(
    name = "mqtt_subscriber",
    skip_all,
    fields(broker_url = %config.broker_url, topic = %config.topic)
)]
pub async fn run_mqtt_subscriber(
    config: MqttSubscriberConfig,
    service: Arc<ReadingIngestionService>,
    token: CancellationToken,
) -> anyhow::Result<()> {
    let (host, port) = parse_broker_url(&config.broker_url)?;

    info!(host, port, client_id = %config.client_id, "starting MQTT subscriber");

    let mut attempt: u32 = 0;

    loop {
        if token.is_cancelled() {
            debug!("MQTT subscriber cancelled before connection");
            break;
        }

        match run_mqtt_connection(&config, host, port, &service, &token, &mut attempt).await {
            Ok(()) => {
                debug!("MQTT subscriber stopped cleanly");
                break;
            }
            Err(e) => {
                attempt = attempt.saturating_add(1);
                let delay = config.reconnect.delay_for(attempt);
                error!(error = %e, "MQTT connection error");
                warn!(attempt, delay_ms = delay.as_millis() as u64, "reconnecting to MQTT broker");

                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }

    info!("MQTT subscriber stopped");
    Ok(())
}

/// Run a single MQTT connection until cancellation or an event loop error
async fn run_mqtt_connection(
    config: &MqttSubscriberConfig,
    host: &str,
    port: u16,
    service: &ReadingIngestionService,
    token: &CancellationToken,
    attempt: &mut u32,
) -> DomainResult<()> {
    let mut mqtt_options = MqttOptions::new(&config.client_id, host, port);
    mqtt_options.set_keep_alive(config.keep_alive.max(MIN_KEEP_ALIVE));
    mqtt_options.set_clean_session(true);

    let (client, mut eventloop) = AsyncClient::new(mqtt_options, 100);

    // queued until the connection is up, re-issued on every reconnect
    client
        .subscribe(&config.topic, QoS::AtMostOnce)
        .await
        .map_err(|e| DomainError::Transport(anyhow::anyhow!("Failed to subscribe: {}", e)))?;

    loop {
        tokio::select! {
            _ = token.cancelled() => {
                debug!("shutdown signal received");
                let _ = client.disconnect().await;
                return Ok(());
            }
            event = eventloop.poll() => {
                match event {
                    // each reading is handled to completion before the next poll
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        service.handle_message(&publish.topic, &publish.payload).await;
                    }
                    // a completed handshake resets the backoff
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("connected to MQTT broker");
                        *attempt = 0;
                    }
                    Ok(Event::Incoming(Packet::SubAck(_))) => {
                        info!(topic = %config.topic, "subscribed to MQTT topic");
                    }
                    // pings, acks and outgoing events
                    Ok(_) => {}
                    // let the outer loop back off and reconnect
                    Err(e) => {
                        return Err(DomainError::Transport(anyhow::anyhow!(
                            "MQTT event loop error: {}",
                            e
                        )));
                    }
                }
            }
        }
    }
}
