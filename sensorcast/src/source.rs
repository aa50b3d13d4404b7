//! Simulated sensor source.
//!
//! Stands in for the platform sensor manager: each present sensor emits a
//! smooth synthetic signal at the configured rate and pushes it through a
//! [`ReadingSink`].

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use sensorcast_common::{Channel, Reading, monotonic_nanos};
use sensorcast_publisher::{PublisherError, ReadingSink};

use crate::config::SourceConfig;

const GRAVITY: f32 = 9.806_65;

/// A physical sensor and the channels it feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sensor {
    Gyroscope,
    Accelerometer,
    AmbientTemperature,
}

impl Sensor {
    /// Every sensor kind.
    pub const ALL: [Sensor; 3] = [
        Sensor::Gyroscope,
        Sensor::Accelerometer,
        Sensor::AmbientTemperature,
    ];

    /// Channels produced by this sensor.
    pub fn channels(self) -> &'static [Channel] {
        match self {
            Sensor::Gyroscope => &[Channel::GyroX, Channel::GyroY, Channel::GyroZ],
            Sensor::Accelerometer => &[Channel::AccelX, Channel::AccelY, Channel::AccelZ],
            Sensor::AmbientTemperature => &[Channel::AmbientTemp],
        }
    }

    /// Human-readable sensor name.
    pub fn name(self) -> &'static str {
        match self {
            Sensor::Gyroscope => "gyroscope",
            Sensor::Accelerometer => "accelerometer",
            Sensor::AmbientTemperature => "ambient temperature",
        }
    }

    fn is_present(self, config: &SourceConfig) -> bool {
        match self {
            Sensor::Gyroscope => config.gyroscope,
            Sensor::Accelerometer => config.accelerometer,
            Sensor::AmbientTemperature => config.ambient_temperature,
        }
    }
}

/// Synthetic multi-sensor source.
pub struct SimulatedSensors {
    sensors: Vec<Sensor>,
    period: Duration,
    sink: Arc<dyn ReadingSink>,
    step: u64,
}

impl SimulatedSensors {
    /// Create a source for the sensors the config marks present.
    ///
    /// Each absent sensor is reported once as a warning. Fails when the
    /// sample rate is out of range.
    pub fn new(
        config: &SourceConfig,
        sink: Arc<dyn ReadingSink>,
    ) -> Result<Self, PublisherError> {
        config.validate()?;

        let mut sensors = Vec::new();
        for sensor in Sensor::ALL {
            if sensor.is_present(config) {
                sensors.push(sensor);
            } else {
                tracing::warn!(sensor = sensor.name(), "Sensor not supported on this device");
            }
        }

        Ok(Self {
            sensors,
            period: Duration::from_secs_f64(1.0 / config.rate_hz),
            sink,
            step: 0,
        })
    }

    /// Sensors this source emits.
    pub fn sensors(&self) -> &[Sensor] {
        &self.sensors
    }

    /// Channels this source emits, in wire order.
    pub fn channels(&self) -> Vec<Channel> {
        let mut channels: Vec<Channel> = self
            .sensors
            .iter()
            .flat_map(|s| s.channels().iter().copied())
            .collect();
        channels.sort();
        channels
    }

    /// Emit one reading per present channel. Returns how many were pushed.
    pub fn sample(&mut self) -> usize {
        let t = self.step as f32 * self.period.as_secs_f32();
        let timestamp = monotonic_nanos();
        self.step += 1;

        let mut pushed = 0;
        for sensor in &self.sensors {
            for &channel in sensor.channels() {
                self.sink
                    .record(Reading::new(channel, synthetic_value(channel, t), timestamp));
                pushed += 1;
            }
        }
        pushed
    }

    /// Sample at the configured rate until shutdown flips to `true`.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        if self.sensors.is_empty() {
            tracing::warn!("No sensors present, source idle");
            return;
        }

        tracing::info!(
            sensors = ?self.sensors.iter().map(|s| s.name()).collect::<Vec<_>>(),
            period_ms = self.period.as_millis() as u64,
            "Starting simulated sensors"
        );

        let mut ticks = tokio::time::interval(self.period);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticks.tick() => {
                    self.sample();
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::debug!(samples = self.step, "Simulated sensors stopped");
    }
}

/// Smooth, bounded signal for a channel at time `t` seconds.
fn synthetic_value(channel: Channel, t: f32) -> f32 {
    match channel {
        Channel::GyroX => 0.5 * (t * 1.3).sin(),
        Channel::GyroY => 0.3 * (t * 0.7).cos(),
        Channel::GyroZ => 0.1 * (t * 2.1).sin(),
        Channel::AccelX => 0.2 * (t * 0.9).sin(),
        Channel::AccelY => 0.2 * (t * 1.1).cos(),
        Channel::AccelZ => GRAVITY + 0.05 * (t * 3.0).sin(),
        Channel::AmbientTemp => 22.0 + 0.5 * (t * 0.01).sin(),
    }
}
