//! SensorCast application configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use sensorcast_publisher::{AppConfig, LoggingConfig, PublisherConfig, PublisherError};

/// Highest accepted simulated sample rate.
pub const MAX_RATE_HZ: f64 = 1000.0;

/// Complete application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorcastConfig {
    /// UDP publisher settings.
    #[serde(default)]
    pub publisher: PublisherConfig,

    /// Sample source settings.
    #[serde(default)]
    pub source: SourceConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Interval between status log lines in seconds (0 = disabled).
    #[serde(default = "default_status_log_interval_secs")]
    pub status_log_interval_secs: u64,
}

fn default_status_log_interval_secs() -> u64 {
    30
}

impl Default for SensorcastConfig {
    fn default() -> Self {
        Self {
            publisher: PublisherConfig::default(),
            source: SourceConfig::default(),
            logging: LoggingConfig::default(),
            status_log_interval_secs: default_status_log_interval_secs(),
        }
    }
}

/// Simulated sensor settings.
///
/// Each flag says whether the device has that sensor. Absent sensors never
/// produce readings, so their channels stay out of every frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Samples per second for each present sensor.
    #[serde(default = "default_rate_hz")]
    pub rate_hz: f64,

    /// Whether the device has a gyroscope.
    #[serde(default = "default_true")]
    pub gyroscope: bool,

    /// Whether the device has an accelerometer.
    #[serde(default = "default_true")]
    pub accelerometer: bool,

    /// Whether the device has an ambient temperature sensor.
    #[serde(default = "default_true")]
    pub ambient_temperature: bool,
}

fn default_rate_hz() -> f64 {
    50.0
}

fn default_true() -> bool {
    true
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            rate_hz: default_rate_hz(),
            gyroscope: true,
            accelerometer: true,
            ambient_temperature: true,
        }
    }
}

impl SourceConfig {
    /// Validate the source settings.
    pub fn validate(&self) -> Result<(), PublisherError> {
        if !self.rate_hz.is_finite() || self.rate_hz <= 0.0 || self.rate_hz > MAX_RATE_HZ {
            return Err(PublisherError::invalid_config(format!(
                "source.rate_hz must be in (0, {}] (got {})",
                MAX_RATE_HZ, self.rate_hz
            )));
        }
        Ok(())
    }
}

impl AppConfig for SensorcastConfig {
    fn publisher(&self) -> &PublisherConfig {
        &self.publisher
    }

    fn logging(&self) -> &LoggingConfig {
        &self.logging
    }

    fn status_interval(&self) -> Option<Duration> {
        (self.status_log_interval_secs > 0)
            .then(|| Duration::from_secs(self.status_log_interval_secs))
    }

    fn validate(&self) -> Result<(), PublisherError> {
        self.publisher.validate()?;
        self.source.validate()
    }
}
