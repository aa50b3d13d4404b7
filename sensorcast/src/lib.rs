//! SensorCast: multi-sensor telemetry over UDP.
//!
//! This crate wires the publisher framework into two binaries:
//!
//! - `sensorcast` samples (simulated) gyroscope, accelerometer and ambient
//!   temperature sensors and publishes frames at a bounded rate
//! - `sensorcast-listen` receives and decodes those frames
//!
//! # Frame Layout
//!
//! ```text
//! version:u8 | sequence:u32 LE | mask:u8 | [timestamp:u64 LE, v2 only] | f32 LE per present channel
//! ```

pub mod config;
pub mod receiver;
pub mod source;

pub use config::{SensorcastConfig, SourceConfig};
pub use receiver::{FrameListener, ListenerStats, ReceivedFrame, SequenceEvent, SequenceTracker};
pub use source::{Sensor, SimulatedSensors};
