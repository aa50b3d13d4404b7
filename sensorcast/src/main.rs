//! SensorCast publisher.
//!
//! Samples the device sensors and publishes them as UDP frames.

use anyhow::Result;
use sensorcast::{SensorcastConfig, SimulatedSensors};
use sensorcast_publisher::run_publisher;

#[tokio::main]
async fn main() -> Result<()> {
    run_publisher::<SensorcastConfig, _>("sensorcast", "sensorcast.json5", |runner| {
        let source = SimulatedSensors::new(&runner.config().source, runner.sink())?;
        let shutdown = runner.shutdown_signal();
        runner.spawn(source.run(shutdown));
        Ok(())
    })
    .await
}
