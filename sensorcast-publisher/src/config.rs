//! Configuration traits and publisher settings.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::path::Path;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use sensorcast_common::{FrameEncoder, LoggingConfig, MAX_DATAGRAM_SIZE, WireVersion};

use crate::error::{PublisherError, Result};

/// Smallest accepted send interval; bounds network and battery usage.
pub const MIN_SEND_INTERVAL_MS: u64 = 10;

/// Trait for application configuration types.
///
/// Implement this trait for your application's configuration struct to get
/// automatic loading, validation, and access to common config fields.
///
/// # Example
///
/// ```ignore
/// use serde::Deserialize;
/// use sensorcast_publisher::{AppConfig, LoggingConfig, PublisherConfig};
///
/// #[derive(Debug, Deserialize)]
/// pub struct MyConfig {
///     pub publisher: PublisherConfig,
///     pub logging: LoggingConfig,
/// }
///
/// impl AppConfig for MyConfig {
///     fn publisher(&self) -> &PublisherConfig {
///         &self.publisher
///     }
///
///     fn logging(&self) -> &LoggingConfig {
///         &self.logging
///     }
/// }
/// ```
pub trait AppConfig: Sized + DeserializeOwned {
    /// Get the publisher configuration.
    fn publisher(&self) -> &PublisherConfig;

    /// Get the logging configuration.
    fn logging(&self) -> &LoggingConfig;

    /// Interval between status log lines; `None` disables them.
    fn status_interval(&self) -> Option<Duration> {
        None
    }

    /// Validate the configuration.
    ///
    /// Called automatically after loading. The default validates the
    /// publisher section; override to add application checks.
    fn validate(&self) -> Result<()> {
        self.publisher().validate()
    }

    /// Load configuration from a file path.
    ///
    /// Supports JSON5 format. Calls [`validate`](Self::validate) after loading.
    fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(PublisherError::ConfigNotFound {
                path: path.display().to_string(),
            });
        }

        let content = std::fs::read_to_string(path)?;
        let config: Self = sensorcast_common::parse_config(&content)
            .map_err(|e| PublisherError::ConfigParse(format!("{}: {}", path.display(), e)))?;

        config.validate()?;

        Ok(config)
    }
}

/// UDP publisher settings.
///
/// Replaced wholesale on reconfiguration; never edited in place while the
/// publisher uses it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublisherConfig {
    /// Destination IPv4 address (dotted quad).
    #[serde(default = "default_destination_address")]
    pub destination_address: String,

    /// Destination UDP port.
    #[serde(default = "default_destination_port")]
    pub destination_port: u16,

    /// Local IPv4 address to bind (selects the outgoing interface).
    #[serde(default = "default_local_address")]
    pub local_address: String,

    /// Local UDP port to bind.
    #[serde(default = "default_local_port")]
    pub local_port: u16,

    /// Interval between frames in milliseconds (minimum 10).
    #[serde(default = "default_send_interval_ms")]
    pub send_interval_ms: u64,

    /// Upper bound on a single send in milliseconds.
    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,

    /// Whether publishing is switched on.
    #[serde(default)]
    pub enabled: bool,

    /// Frame layout version (1 or 2).
    #[serde(default)]
    pub wire_version: WireVersion,

    /// Largest frame allowed on the wire, in bytes.
    #[serde(default = "default_max_frame_size")]
    pub max_frame_size: usize,
}

fn default_destination_address() -> String {
    "127.0.0.1".to_string()
}

fn default_destination_port() -> u16 {
    5005
}

fn default_local_address() -> String {
    "0.0.0.0".to_string()
}

fn default_local_port() -> u16 {
    5006
}

fn default_send_interval_ms() -> u64 {
    50
}

fn default_send_timeout_ms() -> u64 {
    20
}

fn default_max_frame_size() -> usize {
    MAX_DATAGRAM_SIZE
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            destination_address: default_destination_address(),
            destination_port: default_destination_port(),
            local_address: default_local_address(),
            local_port: default_local_port(),
            send_interval_ms: default_send_interval_ms(),
            send_timeout_ms: default_send_timeout_ms(),
            enabled: false,
            wire_version: WireVersion::default(),
            max_frame_size: default_max_frame_size(),
        }
    }
}

impl PublisherConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        parse_ipv4("destination_address", &self.destination_address)?;
        parse_ipv4("local_address", &self.local_address)?;

        if self.destination_port == 0 {
            return Err(PublisherError::invalid_config(
                "destination_port must be between 1 and 65535",
            ));
        }

        if self.local_port == 0 {
            return Err(PublisherError::invalid_config(
                "local_port must be between 1 and 65535",
            ));
        }

        if self.send_interval_ms < MIN_SEND_INTERVAL_MS {
            return Err(PublisherError::invalid_config(format!(
                "send_interval_ms must be >= {} (got {})",
                MIN_SEND_INTERVAL_MS, self.send_interval_ms
            )));
        }

        if self.send_timeout_ms == 0 {
            return Err(PublisherError::invalid_config("send_timeout_ms must be > 0"));
        }

        let header = self.wire_version.header_len();
        if self.max_frame_size < header || self.max_frame_size > MAX_DATAGRAM_SIZE {
            return Err(PublisherError::invalid_config(format!(
                "max_frame_size must be between {} and {} (got {})",
                header, MAX_DATAGRAM_SIZE, self.max_frame_size
            )));
        }

        Ok(())
    }

    /// Destination socket address.
    pub fn destination(&self) -> Result<SocketAddr> {
        let ip = parse_ipv4("destination_address", &self.destination_address)?;
        Ok(SocketAddr::V4(SocketAddrV4::new(ip, self.destination_port)))
    }

    /// Local bind socket address.
    pub fn local_bind(&self) -> Result<SocketAddr> {
        let ip = parse_ipv4("local_address", &self.local_address)?;
        Ok(SocketAddr::V4(SocketAddrV4::new(ip, self.local_port)))
    }

    /// Whether two configs bind the same local socket.
    pub fn same_local_bind(&self, other: &PublisherConfig) -> bool {
        self.local_address == other.local_address && self.local_port == other.local_port
    }

    /// Send interval as a duration.
    pub fn send_interval(&self) -> Duration {
        Duration::from_millis(self.send_interval_ms)
    }

    /// Send timeout as a duration.
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    /// Frame encoder matching this configuration.
    pub fn encoder(&self) -> FrameEncoder {
        FrameEncoder::new(self.wire_version).with_max_frame_size(self.max_frame_size)
    }

    /// Copy of this config with `enabled` set.
    pub fn with_enabled(&self, enabled: bool) -> Self {
        Self {
            enabled,
            ..self.clone()
        }
    }
}

fn parse_ipv4(field: &str, value: &str) -> Result<Ipv4Addr> {
    value.parse::<Ipv4Addr>().map_err(|_| {
        PublisherError::invalid_config(format!(
            "{} '{}' is not a dotted-quad IPv4 address",
            field, value
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize)]
    struct TestConfig {
        publisher: PublisherConfig,
        #[serde(default)]
        logging: LoggingConfig,
    }

    impl AppConfig for TestConfig {
        fn publisher(&self) -> &PublisherConfig {
            &self.publisher
        }

        fn logging(&self) -> &LoggingConfig {
            &self.logging
        }
    }

    #[test]
    fn test_config_not_found() {
        let result = TestConfig::load("/nonexistent/path.json5");
        assert!(matches!(result, Err(PublisherError::ConfigNotFound { .. })));
    }

    #[test]
    fn test_load_from_file() {
        let dir = std::env::temp_dir().join(format!("sensorcast-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let good = dir.join("good.json5");
        std::fs::write(&good, "{ publisher: { destination_port: 7000 } }").unwrap();
        let config = TestConfig::load(&good).unwrap();
        assert_eq!(config.publisher.destination_port, 7000);

        let broken = dir.join("broken.json5");
        std::fs::write(&broken, "{ publisher: ").unwrap();
        assert!(matches!(
            TestConfig::load(&broken),
            Err(PublisherError::ConfigParse(_))
        ));

        let invalid = dir.join("invalid.json5");
        std::fs::write(&invalid, "{ publisher: { send_interval_ms: 1 } }").unwrap();
        assert!(matches!(
            TestConfig::load(&invalid),
            Err(PublisherError::InvalidConfig(_))
        ));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_parse_minimal_config() {
        let config: TestConfig = json5::from_str("{ publisher: {} }").unwrap();

        assert_eq!(config.publisher, PublisherConfig::default());
        assert!(!config.publisher.enabled);
        assert_eq!(config.logging.level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_full_config() {
        let json = r#"{
            publisher: {
                destination_address: "192.168.1.20",
                destination_port: 9000,
                local_address: "192.168.1.5",
                local_port: 9001,
                send_interval_ms: 20,
                send_timeout_ms: 5,
                enabled: true,
                wire_version: 2,
                max_frame_size: 256,
            },
            logging: { level: "debug", format: "json" },
        }"#;

        let config: TestConfig = json5::from_str(json).unwrap();
        let publisher = &config.publisher;
        assert_eq!(
            publisher.destination().unwrap(),
            "192.168.1.20:9000".parse::<SocketAddr>().unwrap()
        );
        assert_eq!(
            publisher.local_bind().unwrap(),
            "192.168.1.5:9001".parse::<SocketAddr>().unwrap()
        );
        assert_eq!(publisher.send_interval(), Duration::from_millis(20));
        assert_eq!(publisher.wire_version, WireVersion::V2);
        assert_eq!(publisher.encoder().max_frame_size(), 256);
        assert!(publisher.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_interval_boundary() {
        let too_fast = PublisherConfig {
            send_interval_ms: 5,
            ..Default::default()
        };
        assert!(matches!(
            too_fast.validate(),
            Err(PublisherError::InvalidConfig(_))
        ));

        let minimum = PublisherConfig {
            send_interval_ms: 10,
            ..Default::default()
        };
        assert!(minimum.validate().is_ok());
    }

    #[test]
    fn test_validate_addresses() {
        let hostname = PublisherConfig {
            destination_address: "phone.local".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            hostname.validate(),
            Err(PublisherError::InvalidConfig(_))
        ));

        let bad_local = PublisherConfig {
            local_address: "10.0.0".to_string(),
            ..Default::default()
        };
        assert!(bad_local.validate().is_err());
    }

    #[test]
    fn test_validate_ports_and_sizes() {
        let zero_port = PublisherConfig {
            destination_port: 0,
            ..Default::default()
        };
        assert!(zero_port.validate().is_err());

        let zero_local = PublisherConfig {
            local_port: 0,
            ..Default::default()
        };
        assert!(zero_local.validate().is_err());

        let oversized = PublisherConfig {
            max_frame_size: 1024,
            ..Default::default()
        };
        assert!(oversized.validate().is_err());

        let below_header = PublisherConfig {
            wire_version: WireVersion::V2,
            max_frame_size: 10,
            ..Default::default()
        };
        assert!(below_header.validate().is_err());

        let no_timeout = PublisherConfig {
            send_timeout_ms: 0,
            ..Default::default()
        };
        assert!(no_timeout.validate().is_err());
    }

    #[test]
    fn test_same_local_bind() {
        let a = PublisherConfig::default();
        let b = PublisherConfig {
            destination_address: "10.1.1.1".to_string(),
            destination_port: 7000,
            ..Default::default()
        };
        let c = PublisherConfig {
            local_port: 6000,
            ..Default::default()
        };

        assert!(a.same_local_bind(&b));
        assert!(!a.same_local_bind(&c));
    }
}
