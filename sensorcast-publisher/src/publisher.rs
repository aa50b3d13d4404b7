//! UDP frame publisher.

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::UdpSocket;

use crate::config::PublisherConfig;
use crate::error::{PublisherError, Result};
use crate::status::{PublisherState, PublisherStatus, StatusTracker};

/// Frame transport driven by the controller.
///
/// [`UdpPublisher`] is the production implementation.
pub trait Transport: Send + 'static {
    /// Open the transport with the given configuration.
    fn start(&mut self, config: PublisherConfig) -> impl Future<Output = Result<()>> + Send;

    /// Send one frame. Failures are recorded in the status, never returned.
    fn send_frame(&mut self, frame: &[u8]) -> impl Future<Output = ()> + Send;

    /// Close the transport. Calling it on a stopped transport is a no-op.
    fn stop(&mut self);

    /// Apply a new configuration while keeping the transport open when possible.
    fn reconfigure(&mut self, config: PublisherConfig)
    -> impl Future<Output = Result<()>> + Send;

    /// Status tracker shared with the controller.
    fn tracker(&self) -> &StatusTracker;

    /// Current status.
    fn status(&self) -> PublisherStatus {
        self.tracker().status()
    }
}

/// Sends frames over a UDP socket bound to the configured local port.
///
/// The socket exists only while the publisher is running and is recreated
/// whenever the local bind address changes.
#[derive(Debug, Default)]
pub struct UdpPublisher {
    socket: Option<UdpSocket>,
    config: Option<PublisherConfig>,
    destination: Option<SocketAddr>,
    send_timeout: Duration,
    consecutive_failures: u64,
    tracker: StatusTracker,
}

impl UdpPublisher {
    /// Create a stopped publisher with its own status tracker.
    pub fn new() -> Self {
        Self::with_tracker(StatusTracker::new())
    }

    /// Create a stopped publisher reporting into an existing tracker.
    pub fn with_tracker(tracker: StatusTracker) -> Self {
        Self {
            socket: None,
            config: None,
            destination: None,
            send_timeout: Duration::ZERO,
            consecutive_failures: 0,
            tracker,
        }
    }

    /// Local address of the bound socket, while running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.as_ref().and_then(|s| s.local_addr().ok())
    }

    /// Current destination, while running.
    pub fn destination(&self) -> Option<SocketAddr> {
        self.destination
    }

    /// Last configuration handed to the publisher.
    pub fn config(&self) -> Option<&PublisherConfig> {
        self.config.as_ref()
    }

    /// Whether the socket is open.
    pub fn is_running(&self) -> bool {
        self.socket.is_some()
    }

    async fn open(&mut self, config: PublisherConfig) -> Result<()> {
        config.validate()?;
        let bind = config.local_bind()?;
        let destination = config.destination()?;

        let previous = self.tracker.state();
        self.tracker.set_state(PublisherState::Starting);

        let socket = match UdpSocket::bind(bind).await {
            Ok(socket) => socket,
            Err(e) => {
                let err = PublisherError::bind_failed(bind, &e);
                tracing::error!(addr = %bind, error = %e, "Failed to bind UDP socket");
                // A failed start leaves the state where it was.
                self.tracker.fail(previous, err.to_string());
                return Err(err);
            }
        };

        let local_addr = socket.local_addr().unwrap_or(bind);

        tracing::info!(
            local = %local_addr,
            destination = %destination,
            interval_ms = config.send_interval_ms,
            version = %config.wire_version,
            "UDP publisher started"
        );

        self.socket = Some(socket);
        self.destination = Some(destination);
        self.send_timeout = config.send_timeout();
        self.consecutive_failures = 0;
        self.config = Some(config);

        self.tracker
            .set_endpoints(Some(local_addr.to_string()), Some(destination.to_string()));
        self.tracker.set_state(PublisherState::Running);

        Ok(())
    }

    fn send_failed(&mut self, err: PublisherError) {
        self.consecutive_failures += 1;

        // Only the first failure of a streak is worth a warning.
        if self.consecutive_failures == 1 {
            tracing::warn!(error = %err, "Failed to send frame");
        } else {
            tracing::debug!(
                error = %err,
                consecutive = self.consecutive_failures,
                "Failed to send frame"
            );
        }

        self.tracker.record_send_failure(err.to_string());
    }
}

impl Transport for UdpPublisher {
    async fn start(&mut self, config: PublisherConfig) -> Result<()> {
        if self.socket.is_some() {
            tracing::debug!("UDP publisher already running");
            return Ok(());
        }

        self.open(config).await
    }

    async fn send_frame(&mut self, frame: &[u8]) {
        let (Some(socket), Some(destination)) = (self.socket.as_ref(), self.destination) else {
            self.tracker
                .record_send_failure(PublisherError::NotRunning.to_string());
            return;
        };

        let result = tokio::time::timeout(self.send_timeout, socket.send_to(frame, destination)).await;

        match result {
            Ok(Ok(sent)) if sent == frame.len() => {
                if self.consecutive_failures > 0 {
                    tracing::info!(
                        destination = %destination,
                        failures = self.consecutive_failures,
                        "Frame delivery recovered"
                    );
                }
                self.consecutive_failures = 0;
                self.tracker.record_sent();
                tracing::trace!(destination = %destination, bytes = sent, "Sent frame");
            }
            Ok(Ok(sent)) => self.send_failed(PublisherError::send_failed(
                destination,
                format!("partial send: {} of {} bytes", sent, frame.len()),
            )),
            Ok(Err(e)) => self.send_failed(PublisherError::send_failed(destination, e)),
            Err(_) => self.send_failed(PublisherError::send_failed(
                destination,
                format!("timed out after {:?}", self.send_timeout),
            )),
        }
    }

    fn stop(&mut self) {
        if let Some(socket) = self.socket.take() {
            let local = socket.local_addr().ok();
            drop(socket);
            tracing::info!(local = ?local, "UDP publisher stopped");
        }

        self.destination = None;
        self.tracker.set_endpoints(None, None);
        self.tracker.set_state(PublisherState::Stopped);
    }

    async fn reconfigure(&mut self, config: PublisherConfig) -> Result<()> {
        config.validate()?;

        let Some(current) = self.config.as_ref().filter(|_| self.socket.is_some()) else {
            // Not running: keep the config for inspection, apply on next start.
            self.config = Some(config);
            return Ok(());
        };

        if current.same_local_bind(&config) {
            let destination = config.destination()?;
            if self.destination != Some(destination) {
                tracing::info!(destination = %destination, "Destination updated");
            }
            self.destination = Some(destination);
            self.send_timeout = config.send_timeout();
            self.tracker.set_destination(destination.to_string());
            self.config = Some(config);
            return Ok(());
        }

        tracing::info!(
            local_address = %config.local_address,
            local_port = config.local_port,
            "Local bind changed, recreating socket"
        );

        self.stop();
        if let Err(e) = self.open(config).await {
            self.tracker.fail(PublisherState::Error, e.to_string());
            return Err(e);
        }

        Ok(())
    }

    fn tracker(&self) -> &StatusTracker {
        &self.tracker
    }
}
