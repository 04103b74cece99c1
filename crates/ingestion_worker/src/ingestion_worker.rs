use crate::domain::ReadingIngestionService;
use crate::mqtt::{run_demo_publisher, run_mqtt_subscriber, DemoPublisherConfig, MqttSubscriberConfig};
use common::crypto::SealedBoxSealer;
use common::{EnvelopeDecryptor, MetricsRecorder, ReadingBroadcaster};
use sensorhub_runner::AppProcess;
use std::sync::Arc;
use tracing::debug;

/// Configuration for the ingestion worker module
pub struct IngestionWorkerConfig {
    pub subscriber: MqttSubscriberConfig,
}

/// MQTT ingestion pipeline, optionally paired with a demo sensor
pub struct IngestionWorker {
    service: Arc<ReadingIngestionService>,
    subscriber_config: MqttSubscriberConfig,
    demo_publisher: Option<(DemoPublisherConfig, Arc<SealedBoxSealer>)>,
}

impl IngestionWorker {
    /// Wire the ingestion service to its collaborators
    ///
    /// # Arguments
    ///
    /// * `decryptor` - Opens sealed envelopes for this server
    /// * `metrics` - Receives the per-reading gauge observations
    /// * `broadcaster` - Forwards decoded readings to subscribers
    /// * `config` - MQTT subscriber settings
    pub fn new(
        decryptor: Arc<dyn EnvelopeDecryptor>,
        metrics: Arc<dyn MetricsRecorder>,
        broadcaster: Arc<dyn ReadingBroadcaster>,
        config: IngestionWorkerConfig,
    ) -> Self {
        debug!("initializing ingestion worker module");

        let service = Arc::new(ReadingIngestionService::new(
            decryptor,
            metrics,
            broadcaster,
        ));

        Self {
            service,
            subscriber_config: config.subscriber,
            demo_publisher: None,
        }
    }

    /// Also publish sealed synthetic readings to the broker
    pub fn with_demo_publisher(
        mut self,
        config: DemoPublisherConfig,
        sealer: Arc<SealedBoxSealer>,
    ) -> Self {
        self.demo_publisher = Some((config, sealer));
        self
    }

    /// The MQTT subscriber process, plus the demo publisher when configured
    pub fn into_runner_processes(self) -> Vec<(&'static str, AppProcess)> {
        let mut processes = Vec::with_capacity(2);

        let service = self.service;
        let subscriber_config = self.subscriber_config;
        let subscriber: AppProcess = Box::new(move |ctx| {
            Box::pin(async move { run_mqtt_subscriber(subscriber_config, service, ctx).await })
        });
        processes.push(("ingestion_mqtt_subscriber", subscriber));

        if let Some((config, sealer)) = self.demo_publisher {
            let publisher: AppProcess = Box::new(move |ctx| {
                Box::pin(async move { run_demo_publisher(config, sealer, ctx).await })
            });
            processes.push(("ingestion_demo_publisher", publisher));
        }

        processes
    }
}
