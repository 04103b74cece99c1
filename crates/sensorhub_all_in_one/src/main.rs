mod config;

use common::crypto::{SealedBoxDecryptor, SealedBoxSealer, ServerSecret};
use common::telemetry::{
    init_telemetry, shutdown_telemetry, OtelMetricsRecorder, TelemetryConfig, TelemetryProviders,
};
use crate::config::ServiceConfig;
use ingestion_worker::{
    DemoPublisherConfig, IngestionWorker, IngestionWorkerConfig, MqttSubscriberConfig,
    ReconnectBackoff,
};
use realtime_hub::{RealtimeHub, RealtimeHubConfig, SessionConfig};
use sensorhub_runner::Runner;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

#[tokio::main]
async fn main() {
    let config = match ServiceConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let telemetry_providers: Option<TelemetryProviders> = match init_telemetry(&TelemetryConfig {
        service_name: config.otel_service_name.clone(),
        otel_endpoint: config.otel_endpoint.clone(),
        otel_enabled: config.otel_enabled,
        log_level: config.log_level.clone(),
        metrics_export_interval: config.metrics_export_interval(),
    }) {
        Ok(providers) => providers,
        Err(e) => {
            eprintln!("Failed to initialize telemetry: {}", e);
            std::process::exit(1);
        }
    };

    info!(
        otel_enabled = config.otel_enabled,
        otel_endpoint = %config.otel_endpoint,
        "Starting sensorhub service"
    );
    debug!("Configuration: {:?}", config);

    let server_secret = match ServerSecret::from_hex(&config.server_private_key) {
        Ok(secret) => secret,
        Err(e) => {
            error!("Failed to load server private key: {}", e);
            std::process::exit(1);
        }
    };

    let realtime_hub = match RealtimeHub::new(RealtimeHubConfig {
        http_host: config.http_host.clone(),
        http_port: config.http_port,
        broadcast_channel_capacity: config.broadcast_channel_capacity,
        session: SessionConfig {
            queue_capacity: config.session_queue_capacity,
            ping_interval: config.ws_ping_interval(),
            pong_timeout: config.ws_pong_timeout(),
            write_timeout: config.ws_write_timeout(),
        },
    })
    .await
    {
        Ok(hub) => hub,
        Err(e) => {
            error!("Failed to initialize realtime hub: {}", e);
            std::process::exit(1);
        }
    };

    let server_public_key = server_secret.public_key();
    let mut ingestion_worker = IngestionWorker::new(
        Arc::new(SealedBoxDecryptor::new(server_secret)),
        Arc::new(OtelMetricsRecorder::from_global()),
        Arc::new(realtime_hub.handle()),
        IngestionWorkerConfig {
            subscriber: MqttSubscriberConfig {
                broker_url: config.mqtt_broker_url.clone(),
                client_id: config.mqtt_client_id.clone(),
                topic: config.mqtt_topic.clone(),
                keep_alive: config.mqtt_keep_alive(),
                reconnect: ReconnectBackoff::new(
                    config.mqtt_reconnect_base_delay(),
                    config.mqtt_reconnect_max_delay(),
                ),
            },
        },
    );

    if config.demo_publisher_enabled {
        info!(device_id = %config.demo_device_id, "demo publisher enabled");
        ingestion_worker = ingestion_worker.with_demo_publisher(
            DemoPublisherConfig {
                broker_url: config.mqtt_broker_url.clone(),
                client_id: format!("{}-demo", config.mqtt_client_id),
                topic: config.mqtt_topic.clone(),
                device_id: config.demo_device_id.clone(),
                interval: config.demo_publisher_interval(),
            },
            Arc::new(SealedBoxSealer::new(server_public_key)),
        );
    }

    let mut runner = Runner::new();

    for (name, process) in realtime_hub.into_runner_processes() {
        runner = runner.with_named_process(name, process);
    }

    for (name, process) in ingestion_worker.into_runner_processes() {
        runner = runner.with_named_process(name, process);
    }

    runner = runner
        .with_closer(move || {
            Box::pin(async move {
                info!("Running cleanup tasks...");
                shutdown_telemetry(telemetry_providers);
                info!("Cleanup complete");
                Ok(())
            })
        })
        .with_closer_timeout(Duration::from_secs(10));

    runner.run().await;
}
