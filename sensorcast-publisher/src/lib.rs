//! SensorCast Publisher
//!
//! Bounded-rate UDP publishing of multi-sensor telemetry.
//!
//! # Overview
//!
//! This crate provides:
//! - [`SampleAggregator`] keeping the latest reading per channel, fed through [`ReadingSink`]
//! - [`UdpPublisher`] sending frames from a fixed local port, behind the [`Transport`] trait
//! - [`PublisherController`] running the non-overlapping send ticker
//! - [`StatusTracker`] and [`PublisherStatus`] for observable publisher state
//! - [`AppConfig`] trait for configuration loading and validation
//! - [`PublisherRunner`] for process lifecycle (startup, shutdown, signal handling)
//! - [`PublisherArgs`] for common CLI argument parsing
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use sensorcast_publisher::{PublisherConfig, PublisherController, SampleAggregator};
//! use sensorcast_common::{Channel, Reading};
//!
//! let aggregator = Arc::new(SampleAggregator::new());
//! let mut controller = PublisherController::new(PublisherConfig::default(), aggregator.clone())?;
//!
//! aggregator.record(Reading::now(Channel::AccelZ, 9.81));
//! controller.enable().await?;
//! ```

mod aggregator;
mod args;
mod config;
mod controller;
mod error;
mod publisher;
mod runner;
mod status;

pub use aggregator::{ReadingSink, SampleAggregator};
pub use args::PublisherArgs;
pub use config::{AppConfig, MIN_SEND_INTERVAL_MS, PublisherConfig};
pub use controller::{PublisherController, TickOutcome};
pub use error::{PublisherError, Result};
pub use publisher::{Transport, UdpPublisher};
pub use runner::{PublisherRunner, run_publisher};
pub use status::{PublisherState, PublisherStatus, StatusReport, StatusTracker};

// Re-export commonly used types from sensorcast-common
pub use sensorcast_common::{
    Channel, FrameEncoder, LogFormat, LoggingConfig, Reading, Snapshot, WireVersion,
};
