//! Client configuration

use memrpc_proto::codec::DEFAULT_MAX_PAYLOAD_SIZE;
use serde::{Deserialize, Serialize};

/// Default server host
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default server port, fixed on both sides
pub const DEFAULT_PORT: u16 = memrpc_proto::DEFAULT_PORT;

/// Where to reach the server and how much to accept from it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Server hostname or IP
    pub host: String,
    /// Server TCP port
    pub port: u16,
    /// Largest response payload accepted before the connection is dropped
    pub max_payload_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
        }
    }
}

impl ClientConfig {
    /// Create a configuration for the given endpoint
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    /// Parse a `host`, `host:port` or `[v6addr]:port` target
    ///
    /// A missing or unparsable port falls back to [`DEFAULT_PORT`].
    pub fn from_target(target: &str) -> Self {
        let (host, port) = Self::parse_target(target);
        Self::new(host, port)
    }

    /// Set the maximum accepted payload size
    pub fn with_max_payload_size(mut self, max_payload_size: usize) -> Self {
        self.max_payload_size = max_payload_size;
        self
    }

    /// `host:port` form of the endpoint
    pub fn endpoint(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    fn parse_target(target: &str) -> (String, u16) {
        let target = target.trim();

        if let Some(rest) = target.strip_prefix('[') {
            if let Some((host, tail)) = rest.split_once(']') {
                let port = tail
                    .strip_prefix(':')
                    .and_then(|p| p.parse().ok())
                    .unwrap_or(DEFAULT_PORT);
                return (host.to_string(), port);
            }
        }

        match target.rsplit_once(':') {
            Some((host, port)) if !host.contains(':') => {
                (host.to_string(), port.parse().unwrap_or(DEFAULT_PORT))
            }
            _ => (target.to_string(), DEFAULT_PORT),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_endpoint() {
        let config = ClientConfig::default();
        assert_eq!(config.endpoint(), "127.0.0.1:27042");
        assert_eq!(config.max_payload_size, 16 * 1024 * 1024);
    }

    #[test]
    fn test_parse_target() {
        assert_eq!(ClientConfig::parse_target("10.0.0.2:9000"), ("10.0.0.2".to_string(), 9000));
        assert_eq!(ClientConfig::parse_target("box"), ("box".to_string(), DEFAULT_PORT));
        assert_eq!(ClientConfig::parse_target("box:nope"), ("box".to_string(), DEFAULT_PORT));
        assert_eq!(ClientConfig::parse_target("[::1]:7000"), ("::1".to_string(), 7000));
        assert_eq!(ClientConfig::parse_target("::1"), ("::1".to_string(), DEFAULT_PORT));
    }

    #[test]
    fn test_ipv6_endpoint() {
        let config = ClientConfig::from_target("[::1]:7000");
        assert_eq!(config.endpoint(), "[::1]:7000");
    }

    #[test]
    fn test_builder() {
        let config = ClientConfig::new("example", 1).with_max_payload_size(64);
        assert_eq!(config.host, "example");
        assert_eq!(config.port, 1);
        assert_eq!(config.max_payload_size, 64);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: ClientConfig = serde_json::from_str(r#"{"port": 9000}"#).unwrap();
        assert_eq!(config.host, DEFAULT_HOST);
        assert_eq!(config.port, 9000);
        assert_eq!(config.max_payload_size, DEFAULT_MAX_PAYLOAD_SIZE);
    }
}
