//! End-to-end tests: simulated sensors -> publisher -> listener.

use std::time::Duration;

use sensorcast::{FrameListener, SensorcastConfig, SimulatedSensors, SourceConfig};
use sensorcast_common::{Channel, WireVersion};
use sensorcast_publisher::{AppConfig, PublisherConfig, PublisherRunner, PublisherState};
use tokio::sync::{mpsc, watch};
use tokio_test::assert_ok;

fn free_port() -> u16 {
    std::net::UdpSocket::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

fn config(destination_port: u16, source: SourceConfig) -> SensorcastConfig {
    SensorcastConfig {
        publisher: PublisherConfig {
            destination_address: "127.0.0.1".to_string(),
            destination_port,
            local_address: "127.0.0.1".to_string(),
            local_port: free_port(),
            send_interval_ms: 20,
            send_timeout_ms: 200,
            enabled: true,
            wire_version: WireVersion::V2,
            ..Default::default()
        },
        source,
        status_log_interval_secs: 0,
        ..Default::default()
    }
}

/// Frames published from simulated sensors reach the listener intact.
#[tokio::test]
async fn test_publisher_to_listener() {
    let listener = FrameListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (tx, mut rx) = mpsc::channel(64);
    let (stop_listener, listener_shutdown) = watch::channel(false);
    let listener_task = tokio::spawn(listener.run(tx, listener_shutdown));

    let source = SourceConfig {
        rate_hz: 200.0,
        ambient_temperature: false,
        ..Default::default()
    };
    let config = config(port, source);
    assert_ok!(config.validate());

    let mut runner = PublisherRunner::from_config("sensorcast", config).unwrap();
    let sensors = SimulatedSensors::new(&runner.config().source, runner.sink()).unwrap();
    let shutdown = runner.shutdown_signal();
    runner.spawn(sensors.run(shutdown));

    let run = tokio::spawn(runner.run_until(tokio::time::sleep(Duration::from_millis(300))));

    let mut frames = Vec::new();
    while frames.len() < 5 {
        let received = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for frames")
            .expect("listener stopped");
        frames.push(received.frame);
    }

    let status = run.await.unwrap().unwrap();
    stop_listener.send(true).unwrap();
    let stats = listener_task.await.unwrap();

    assert_eq!(status.state, PublisherState::Stopped);
    assert!(status.frames_sent >= 5);
    assert_eq!(stats.decode_failures, 0);

    let last = frames.last().unwrap();
    assert_eq!(last.version, WireVersion::V2);
    assert!(last.timestamp.is_some());
    // Once the source has sampled, every motion channel is present and
    // temperature never is.
    assert_eq!(last.presence_mask(), 0b0011_1111);
    assert!(last.value(Channel::AmbientTemp).is_none());

    for pair in frames.windows(2) {
        assert!(pair[1].sequence > pair[0].sequence);
    }
}

/// A publisher that is configured off sends nothing.
#[tokio::test]
async fn test_disabled_publisher_is_silent() {
    let mut listener = FrameListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let mut config = config(port, SourceConfig::default());
    config.publisher.enabled = false;

    let runner = PublisherRunner::from_config("sensorcast", config).unwrap();
    let status = runner
        .run_until(tokio::time::sleep(Duration::from_millis(100)))
        .await
        .unwrap();

    assert_eq!(status.frames_sent, 0);
    let received = tokio::time::timeout(Duration::from_millis(100), listener.recv()).await;
    assert!(received.is_err());
}

/// A taken local port makes the runner fail instead of running silently.
#[tokio::test]
async fn test_runner_reports_bind_failure() {
    let holder = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
    let taken = holder.local_addr().unwrap().port();

    let mut config = config(9, SourceConfig::default());
    config.publisher.local_port = taken;

    let runner = PublisherRunner::from_config("sensorcast", config).unwrap();
    let result = runner.run_until(std::future::pending::<()>()).await;

    assert!(result.is_err());
}
