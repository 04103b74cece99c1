use common::{DomainError, DomainResult};
use std::time::Duration;

/// Port used when the broker URL omits one
pub const DEFAULT_MQTT_PORT: u16 = 1883;

/// Parse broker URL in format mqtt://host:port, tcp://host:port or host[:port]
pub fn parse_broker_url(url: &str) -> DomainResult<(&str, u16)> {
    let address = url.trim();
    let address = address.strip_prefix("mqtt://").unwrap_or(address);
    let address = address.strip_prefix("tcp://").unwrap_or(address);
    let address = address.trim_end_matches('/');

    let parts: Vec<&str> = address.split(':').collect();
    match parts.as_slice() {
        [host] if !host.is_empty() => Ok((*host, DEFAULT_MQTT_PORT)),
        [host, port] if !host.is_empty() => {
            let port = port.parse::<u16>().map_err(|_| {
                DomainError::InvalidConfig(format!("Invalid port in broker URL: {}", port))
            })?;
            Ok((*host, port))
        }
        _ => Err(DomainError::InvalidConfig(format!(
            "Invalid broker URL format: {}",
            url
        ))),
    }
}

/// Capped exponential delay between reconnect attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectBackoff {
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl ReconnectBackoff {
    pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            base_delay,
            max_delay: max_delay.max(base_delay),
        }
    }

    /// Delay before reconnect attempt number `attempt`, starting at 1
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }
}

impl Default for ReconnectBackoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(30))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_broker_url_with_port() {
        let (host, port) = parse_broker_url("mqtt://localhost:1883").unwrap();
        assert_eq!(host, "localhost");
        assert_eq!(port, 1883);
    }

    #[test]
    fn test_parse_broker_url_without_scheme() {
        let (host, port) = parse_broker_url("broker.hivemq.com:8883").unwrap();
        assert_eq!(host, "broker.hivemq.com");
        assert_eq!(port, 8883);
    }

    #[test]
    fn test_parse_broker_url_default_port() {
        let (host, port) = parse_broker_url("tcp://broker.local").unwrap();
        assert_eq!(host, "broker.local");
        assert_eq!(port, DEFAULT_MQTT_PORT);
    }

    #[test]
    fn test_parse_broker_url_invalid_port() {
        let result = parse_broker_url("mqtt://localhost:notaport");
        assert!(matches!(result, Err(DomainError::InvalidConfig(_))));
    }

    #[test]
    fn test_parse_broker_url_empty_host() {
        assert!(parse_broker_url("mqtt://").is_err());
        assert!(parse_broker_url("mqtt://:1883").is_err());
        assert!(parse_broker_url("a:b:c").is_err());
    }

    #[test]
    fn test_backoff_doubles_until_capped() {
        let backoff = ReconnectBackoff::new(Duration::from_millis(500), Duration::from_secs(3));

        assert_eq!(backoff.delay_for(1), Duration::from_millis(500));
        assert_eq!(backoff.delay_for(2), Duration::from_secs(1));
        assert_eq!(backoff.delay_for(3), Duration::from_secs(2));
        assert_eq!(backoff.delay_for(4), Duration::from_secs(3));
        assert_eq!(backoff.delay_for(u32::MAX), Duration::from_secs(3));
    }

    #[test]
    fn test_backoff_max_never_below_base() {
        let backoff = ReconnectBackoff::new(Duration::from_secs(5), Duration::from_secs(1));
        assert_eq!(backoff.delay_for(1), Duration::from_secs(5));
    }
}
