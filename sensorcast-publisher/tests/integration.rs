//! Loopback integration tests for sensorcast-publisher.

use std::sync::Arc;
use std::time::Duration;

use sensorcast_common::{Channel, Frame, Reading, WireVersion, decode};
use sensorcast_publisher::{
    PublisherConfig, PublisherController, PublisherError, PublisherState, SampleAggregator,
    Transport, UdpPublisher,
};
use tokio::net::UdpSocket;
use tokio_test::{assert_err, assert_ok};

fn free_port() -> u16 {
    std::net::UdpSocket::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

async fn listener() -> (UdpSocket, u16) {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let port = socket.local_addr().unwrap().port();
    (socket, port)
}

fn loopback(destination_port: u16) -> PublisherConfig {
    PublisherConfig {
        destination_address: "127.0.0.1".to_string(),
        destination_port,
        local_address: "127.0.0.1".to_string(),
        local_port: free_port(),
        send_interval_ms: 20,
        send_timeout_ms: 200,
        ..Default::default()
    }
}

async fn recv_frame(socket: &UdpSocket) -> (Frame, u16) {
    let mut buf = [0u8; 1024];
    let (len, from) = tokio::time::timeout(Duration::from_secs(2), socket.recv_from(&mut buf))
        .await
        .expect("no datagram received")
        .unwrap();
    (decode(&buf[..len]).unwrap(), from.port())
}

/// Readings recorded in the aggregator arrive at the listener as decodable frames.
#[tokio::test]
async fn test_end_to_end_delivery() {
    let (socket, port) = listener().await;
    let config = loopback(port);
    let local_port = config.local_port;

    let aggregator = Arc::new(SampleAggregator::new());
    aggregator.record(Reading::new(Channel::GyroX, 0.5, 10));
    aggregator.record(Reading::new(Channel::AccelZ, 9.81, 10));
    aggregator.record(Reading::new(Channel::AmbientTemp, 22.5, 10));

    let mut controller = PublisherController::new(config, aggregator).unwrap();
    assert_ok!(controller.enable().await);

    let (first, from) = recv_frame(&socket).await;
    let (second, _) = recv_frame(&socket).await;
    controller.disable().await;

    // Frames originate from the configured fixed local port.
    assert_eq!(from, local_port);
    assert_eq!(first.version, WireVersion::V1);
    assert_eq!(first.value(Channel::GyroX), Some(0.5));
    assert_eq!(first.value(Channel::AccelZ), Some(9.81));
    assert_eq!(first.value(Channel::AmbientTemp), Some(22.5));
    assert_eq!(first.value(Channel::GyroY), None);
    assert_eq!(second.sequence, first.sequence.wrapping_add(1));
}

/// A device without a temperature sensor still publishes motion channels.
#[tokio::test]
async fn test_missing_temperature_channel() {
    let (socket, port) = listener().await;
    let aggregator = Arc::new(SampleAggregator::new());
    for channel in [
        Channel::GyroX,
        Channel::GyroY,
        Channel::GyroZ,
        Channel::AccelX,
        Channel::AccelY,
        Channel::AccelZ,
    ] {
        aggregator.record(Reading::new(channel, 1.0, 1));
    }

    let mut controller = PublisherController::new(loopback(port), aggregator).unwrap();
    assert_ok!(controller.enable().await);
    let (frame, _) = recv_frame(&socket).await;
    controller.disable().await;

    assert_eq!(frame.presence_mask(), 0b0011_1111);
    assert_eq!(frame.values.len(), 6);
}

/// Version 2 frames carry the newest reading timestamp.
#[tokio::test]
async fn test_v2_frames_over_udp() {
    let (socket, port) = listener().await;
    let aggregator = Arc::new(SampleAggregator::new());
    aggregator.record(Reading::new(Channel::AccelX, -1.25, 1_000));
    aggregator.record(Reading::new(Channel::GyroZ, 3.0, 2_000));

    let config = PublisherConfig {
        wire_version: WireVersion::V2,
        ..loopback(port)
    };
    let mut controller = PublisherController::new(config, aggregator).unwrap();
    assert_ok!(controller.enable().await);
    let (frame, _) = recv_frame(&socket).await;
    controller.disable().await;

    assert_eq!(frame.version, WireVersion::V2);
    assert_eq!(frame.timestamp, Some(2_000));
    assert_eq!(frame.value(Channel::AccelX), Some(-1.25));
}

/// Changing only the destination keeps the socket and redirects frames.
#[tokio::test]
async fn test_reconfigure_destination_while_running() {
    let (first_socket, first_port) = listener().await;
    let (second_socket, second_port) = listener().await;

    let aggregator = Arc::new(SampleAggregator::new());
    aggregator.record(Reading::new(Channel::GyroX, 1.0, 1));

    let config = loopback(first_port).with_enabled(true);
    let local_port = config.local_port;
    let mut controller = PublisherController::new(config.clone(), aggregator).unwrap();
    assert_ok!(controller.enable().await);
    recv_frame(&first_socket).await;

    let redirected = PublisherConfig {
        destination_port: second_port,
        ..config
    };
    assert_ok!(controller.set_config(redirected).await);

    let (_, from) = recv_frame(&second_socket).await;
    assert_eq!(from, local_port);
    assert_eq!(
        controller.status().destination,
        Some(format!("127.0.0.1:{}", second_port))
    );

    controller.disable().await;
}

/// Moving to a local port that is already taken halts publishing with an error.
#[tokio::test]
async fn test_reconfigure_to_taken_port() {
    let (_socket, port) = listener().await;
    let holder = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
    let taken = holder.local_addr().unwrap().port();

    let aggregator = Arc::new(SampleAggregator::new());
    let config = loopback(port).with_enabled(true);
    let mut controller = PublisherController::new(config.clone(), aggregator).unwrap();
    assert_ok!(controller.enable().await);

    let moved = PublisherConfig {
        local_port: taken,
        ..config
    };
    let err = assert_err!(controller.set_config(moved).await);

    assert!(matches!(err, PublisherError::BindFailed { .. }));
    assert!(!controller.is_ticking());
    let status = controller.status();
    assert_eq!(status.state, PublisherState::Error);
    assert!(status.last_error.is_some());

    // A fresh enable recovers.
    let recovered = PublisherConfig {
        local_port: free_port(),
        ..controller.config().clone()
    };
    assert_ok!(controller.set_config(recovered.with_enabled(true)).await);
    assert_eq!(controller.status().state, PublisherState::Running);
    controller.disable().await;
}

/// Enabling while the local port is held elsewhere reports the failure.
#[tokio::test]
async fn test_enable_with_port_conflict() {
    let holder = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
    let taken = holder.local_addr().unwrap().port();

    let config = PublisherConfig {
        local_port: taken,
        ..loopback(9)
    };
    let mut controller =
        PublisherController::new(config, Arc::new(SampleAggregator::new())).unwrap();

    let err = assert_err!(controller.enable().await);
    assert!(matches!(err, PublisherError::BindFailed { .. }));

    let status = controller.status();
    assert_eq!(status.state, PublisherState::Stopped);
    assert!(status.last_error.unwrap().contains(&taken.to_string()));
}

/// No datagram arrives after disable returns.
#[tokio::test]
async fn test_no_frames_after_disable() {
    let (socket, port) = listener().await;
    let aggregator = Arc::new(SampleAggregator::new());
    aggregator.record(Reading::new(Channel::AccelY, 0.1, 1));

    let mut controller = PublisherController::new(loopback(port), aggregator).unwrap();
    assert_ok!(controller.enable().await);
    recv_frame(&socket).await;
    controller.disable().await;

    // Drain anything sent before disable returned.
    let mut buf = [0u8; 1024];
    while let Ok(Ok(_)) =
        tokio::time::timeout(Duration::from_millis(50), socket.recv_from(&mut buf)).await
    {}

    let late = tokio::time::timeout(Duration::from_millis(200), socket.recv_from(&mut buf)).await;
    assert!(late.is_err(), "received a frame after disable");
}

/// The publisher transport can be driven directly.
#[tokio::test]
async fn test_udp_publisher_start_stop_cycle() {
    let (socket, port) = listener().await;
    let mut publisher = UdpPublisher::new();
    let config = loopback(port);

    assert_ok!(publisher.start(config.clone()).await);
    assert_ok!(publisher.start(config.clone()).await);
    publisher.send_frame(&[1, 0, 0, 0, 0, 0]).await;
    let (frame, _) = recv_frame(&socket).await;
    assert!(frame.values.is_empty());

    publisher.stop();
    publisher.stop();
    assert_eq!(publisher.status().state, PublisherState::Stopped);

    // The port is free again after stop.
    assert_ok!(publisher.start(config).await);
    assert_eq!(publisher.status().frames_sent, 1);
    publisher.stop();
}
