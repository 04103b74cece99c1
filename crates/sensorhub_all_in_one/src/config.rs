use config::{Config, ConfigError, Environment};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

#[derive(Deserialize, Serialize, Clone)]
pub struct ServiceConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    // MQTT configuration
    /// Broker URL: mqtt://host:port, tcp://host:port or host[:port]
    #[serde(default = "default_mqtt_broker_url")]
    pub mqtt_broker_url: String,

    #[serde(default = "default_mqtt_client_id")]
    pub mqtt_client_id: String,

    /// Topic the sensors publish sealed readings to
    #[serde(default = "default_mqtt_topic")]
    pub mqtt_topic: String,

    #[serde(default = "default_mqtt_keep_alive_secs")]
    pub mqtt_keep_alive_secs: u64,

    #[serde(default = "default_mqtt_reconnect_base_delay_ms")]
    pub mqtt_reconnect_base_delay_ms: u64,

    #[serde(default = "default_mqtt_reconnect_max_delay_ms")]
    pub mqtt_reconnect_max_delay_ms: u64,

    // Crypto configuration
    /// Hex encoded X25519 server secret
    #[serde(default)]
    pub server_private_key: String,

    // Streaming endpoint configuration
    #[serde(default = "default_http_host")]
    pub http_host: String,

    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// Per-subscriber outbound queue size; a full queue evicts the subscriber
    #[serde(default = "default_session_queue_capacity")]
    pub session_queue_capacity: usize,

    #[serde(default = "default_broadcast_channel_capacity")]
    pub broadcast_channel_capacity: usize,

    #[serde(default = "default_ws_ping_interval_secs")]
    pub ws_ping_interval_secs: u64,

    #[serde(default = "default_ws_pong_timeout_secs")]
    pub ws_pong_timeout_secs: u64,

    #[serde(default = "default_ws_write_timeout_secs")]
    pub ws_write_timeout_secs: u64,

    // OpenTelemetry configuration
    #[serde(default)]
    pub otel_enabled: bool,

    #[serde(default = "default_otel_endpoint")]
    pub otel_endpoint: String,

    #[serde(default = "default_otel_service_name")]
    pub otel_service_name: String,

    #[serde(default = "default_metrics_export_interval_secs")]
    pub metrics_export_interval_secs: u64,

    // Demo sensor configuration
    #[serde(default)]
    pub demo_publisher_enabled: bool,

    #[serde(default = "default_demo_publisher_interval_ms")]
    pub demo_publisher_interval_ms: u64,

    #[serde(default = "default_demo_device_id")]
    pub demo_device_id: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_mqtt_broker_url() -> String {
    "mqtt://localhost:1883".to_string()
}

fn default_mqtt_client_id() -> String {
    "sensorhub-ingestion".to_string()
}

fn default_mqtt_topic() -> String {
    "esp32/kriptografi/encrypted/ldr-pir".to_string()
}

fn default_mqtt_keep_alive_secs() -> u64 {
    30
}

fn default_mqtt_reconnect_base_delay_ms() -> u64 {
    1000
}

fn default_mqtt_reconnect_max_delay_ms() -> u64 {
    30_000
}

fn default_http_host() -> String {
    "0.0.0.0".to_string()
}

fn default_http_port() -> u16 {
    8080
}

fn default_session_queue_capacity() -> usize {
    256
}

fn default_broadcast_channel_capacity() -> usize {
    1024
}

fn default_ws_ping_interval_secs() -> u64 {
    54
}

fn default_ws_pong_timeout_secs() -> u64 {
    60
}

fn default_ws_write_timeout_secs() -> u64 {
    10
}

fn default_otel_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_otel_service_name() -> String {
    "sensorhub".to_string()
}

fn default_metrics_export_interval_secs() -> u64 {
    10
}

fn default_demo_publisher_interval_ms() -> u64 {
    2000
}

fn default_demo_device_id() -> String {
    "esp32-device-001".to_string()
}

impl ServiceConfig {
    /// Load configuration from `SENSORHUB_`-prefixed environment variables
    ///
    /// Fails when a timer interval is zero, since tokio intervals panic on a
    /// zero period.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config: Self = Config::builder()
            .add_source(Environment::with_prefix("SENSORHUB"))
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let intervals = [
            ("mqtt_reconnect_base_delay_ms", self.mqtt_reconnect_base_delay_ms),
            ("ws_ping_interval_secs", self.ws_ping_interval_secs),
            ("ws_pong_timeout_secs", self.ws_pong_timeout_secs),
            ("ws_write_timeout_secs", self.ws_write_timeout_secs),
            ("metrics_export_interval_secs", self.metrics_export_interval_secs),
            ("demo_publisher_interval_ms", self.demo_publisher_interval_ms),
        ];

        match intervals.iter().find(|(_, value)| *value == 0) {
            Some((name, _)) => Err(ConfigError::Message(format!(
                "{} must be greater than zero",
                name
            ))),
            None => Ok(()),
        }
    }

    pub fn mqtt_keep_alive(&self) -> Duration {
        Duration::from_secs(self.mqtt_keep_alive_secs)
    }

    pub fn mqtt_reconnect_base_delay(&self) -> Duration {
        Duration::from_millis(self.mqtt_reconnect_base_delay_ms)
    }

    pub fn mqtt_reconnect_max_delay(&self) -> Duration {
        Duration::from_millis(self.mqtt_reconnect_max_delay_ms)
    }

    pub fn ws_ping_interval(&self) -> Duration {
        Duration::from_secs(self.ws_ping_interval_secs)
    }

    pub fn ws_pong_timeout(&self) -> Duration {
        Duration::from_secs(self.ws_pong_timeout_secs)
    }

    pub fn ws_write_timeout(&self) -> Duration {
        Duration::from_secs(self.ws_write_timeout_secs)
    }

    pub fn metrics_export_interval(&self) -> Duration {
        Duration::from_secs(self.metrics_export_interval_secs)
    }

    pub fn demo_publisher_interval(&self) -> Duration {
        Duration::from_millis(self.demo_publisher_interval_ms)
    }
}

// server_private_key stays out of debug logs
impl fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("log_level", &self.log_level)
            .field("mqtt_broker_url", &self.mqtt_broker_url)
            .field("mqtt_client_id", &self.mqtt_client_id)
            .field("mqtt_topic", &self.mqtt_topic)
            .field("mqtt_keep_alive_secs", &self.mqtt_keep_alive_secs)
            .field("mqtt_reconnect_base_delay_ms", &self.mqtt_reconnect_base_delay_ms)
            .field("mqtt_reconnect_max_delay_ms", &self.mqtt_reconnect_max_delay_ms)
            .field("server_private_key", &"<redacted>")
            .field("http_host", &self.http_host)
            .field("http_port", &self.http_port)
            .field("session_queue_capacity", &self.session_queue_capacity)
            .field("broadcast_channel_capacity", &self.broadcast_channel_capacity)
            .field("ws_ping_interval_secs", &self.ws_ping_interval_secs)
            .field("ws_pong_timeout_secs", &self.ws_pong_timeout_secs)
            .field("ws_write_timeout_secs", &self.ws_write_timeout_secs)
            .field("otel_enabled", &self.otel_enabled)
            .field("otel_endpoint", &self.otel_endpoint)
            .field("otel_service_name", &self.otel_service_name)
            .field("metrics_export_interval_secs", &self.metrics_export_interval_secs)
            .field("demo_publisher_enabled", &self.demo_publisher_enabled)
            .field("demo_publisher_interval_ms", &self.demo_publisher_interval_ms)
            .field("demo_device_id", &self.demo_device_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Mutex to ensure tests run serially and don't interfere with each other
    static TEST_LOCK: Mutex<()> = Mutex::new(());

    fn clear_env() {
        for key in [
            "SENSORHUB_LOG_LEVEL",
            "SENSORHUB_HTTP_PORT",
            "SENSORHUB_MQTT_TOPIC",
            "SENSORHUB_DEMO_PUBLISHER_ENABLED",
            "SENSORHUB_SERVER_PRIVATE_KEY",
            "SENSORHUB_MQTT_RECONNECT_BASE_DELAY_MS",
            "SENSORHUB_WS_PING_INTERVAL_SECS",
            "SENSORHUB_WS_PONG_TIMEOUT_SECS",
            "SENSORHUB_WS_WRITE_TIMEOUT_SECS",
            "SENSORHUB_METRICS_EXPORT_INTERVAL_SECS",
            "SENSORHUB_DEMO_PUBLISHER_INTERVAL_MS",
        ] {
            std::env::remove_var(key);
        }
    }

    #[test]
    fn test_default_config() {
        let _lock = TEST_LOCK.lock().unwrap();
        clear_env();

        let config = ServiceConfig::from_env().unwrap();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.mqtt_topic, "esp32/kriptografi/encrypted/ldr-pir");
        assert_eq!(config.http_port, 8080);
        assert_eq!(config.session_queue_capacity, 256);
        assert_eq!(config.ws_ping_interval(), Duration::from_secs(54));
        assert_eq!(config.ws_pong_timeout(), Duration::from_secs(60));
        assert_eq!(config.mqtt_reconnect_max_delay(), Duration::from_secs(30));
        assert!(!config.demo_publisher_enabled);
        assert!(config.server_private_key.is_empty());
    }

    #[test]
    fn test_custom_config() {
        let _lock = TEST_LOCK.lock().unwrap();
        clear_env();

        std::env::set_var("SENSORHUB_LOG_LEVEL", "debug");
        std::env::set_var("SENSORHUB_HTTP_PORT", "9090");
        std::env::set_var("SENSORHUB_DEMO_PUBLISHER_ENABLED", "true");

        let config = ServiceConfig::from_env().unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.http_port, 9090);
        assert!(config.demo_publisher_enabled);

        clear_env();
    }

    #[test]
    fn test_debug_redacts_private_key() {
        let _lock = TEST_LOCK.lock().unwrap();
        clear_env();

        std::env::set_var(
            "SENSORHUB_SERVER_PRIVATE_KEY",
            "4174bee44869f6672f32daed3ca7dd10b8a8141813df58ebfc00dda0563cfbc1",
        );
        let config = ServiceConfig::from_env().unwrap();
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("4174bee4"));

        clear_env();
    }

    #[test]
    fn test_zero_intervals_are_rejected() {
        let _lock = TEST_LOCK.lock().unwrap();

        for (key, field) in [
            ("SENSORHUB_MQTT_RECONNECT_BASE_DELAY_MS", "mqtt_reconnect_base_delay_ms"),
            ("SENSORHUB_WS_PING_INTERVAL_SECS", "ws_ping_interval_secs"),
            ("SENSORHUB_WS_PONG_TIMEOUT_SECS", "ws_pong_timeout_secs"),
            ("SENSORHUB_WS_WRITE_TIMEOUT_SECS", "ws_write_timeout_secs"),
            ("SENSORHUB_METRICS_EXPORT_INTERVAL_SECS", "metrics_export_interval_secs"),
            ("SENSORHUB_DEMO_PUBLISHER_INTERVAL_MS", "demo_publisher_interval_ms"),
        ] {
            clear_env();
            std::env::set_var(key, "0");

            let err = ServiceConfig::from_env().unwrap_err();
            assert!(
                err.to_string().contains(field),
                "unexpected error for {}: {}",
                key,
                err
            );
        }

        clear_env();
    }

    #[test]
    fn test_nonzero_intervals_are_accepted() {
        let _lock = TEST_LOCK.lock().unwrap();
        clear_env();

        std::env::set_var("SENSORHUB_WS_PING_INTERVAL_SECS", "1");
        std::env::set_var("SENSORHUB_DEMO_PUBLISHER_INTERVAL_MS", "1");

        let config = ServiceConfig::from_env().unwrap();
        assert_eq!(config.ws_ping_interval(), Duration::from_secs(1));
        assert_eq!(config.demo_publisher_interval(), Duration::from_millis(1));

        clear_env();
    }
}
