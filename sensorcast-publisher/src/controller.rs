//! Rate-bounded publishing loop.
//!
//! The controller owns the publisher configuration and drives one tick per
//! send interval: snapshot the aggregator, encode, hand the frame to the
//! transport. A tick never overlaps the previous one; ticks that fall due
//! while a slow send is still in flight are skipped, not queued.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use sensorcast_common::FrameEncoder;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::aggregator::SampleAggregator;
use crate::config::PublisherConfig;
use crate::error::Result;
use crate::publisher::{Transport, UdpPublisher};
use crate::status::{PublisherState, PublisherStatus, StatusTracker};

/// What a single tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// A frame was handed to the transport.
    Dispatched { sequence: u32, bytes: usize },
    /// The frame could not be encoded and was dropped.
    Dropped,
    /// The previous tick was still in flight.
    Skipped,
    /// The transport is not running.
    NotRunning,
}

/// Drives the aggregator and transport at the configured rate.
pub struct PublisherController<T: Transport = UdpPublisher> {
    config: PublisherConfig,
    pipeline: Arc<Pipeline<T>>,
    ticker: Option<Ticker>,
}

struct Pipeline<T> {
    aggregator: Arc<SampleAggregator>,
    transport: Mutex<T>,
    in_flight: AtomicBool,
    tracker: StatusTracker,
}

struct Ticker {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Clears the in-flight flag when a tick ends, however it ends.
struct TickGuard<'a>(&'a AtomicBool);

impl<'a> TickGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for TickGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl PublisherController<UdpPublisher> {
    /// Create a controller publishing over UDP.
    ///
    /// The config is validated; nothing is bound until [`enable`](Self::enable).
    pub fn new(config: PublisherConfig, aggregator: Arc<SampleAggregator>) -> Result<Self> {
        Self::with_transport(config, aggregator, UdpPublisher::new())
    }
}

impl<T: Transport> PublisherController<T> {
    /// Create a controller over a custom transport.
    pub fn with_transport(
        config: PublisherConfig,
        aggregator: Arc<SampleAggregator>,
        transport: T,
    ) -> Result<Self> {
        config.validate()?;

        let tracker = transport.tracker().clone();
        let pipeline = Pipeline {
            aggregator,
            transport: Mutex::new(transport),
            in_flight: AtomicBool::new(false),
            tracker,
        };

        Ok(Self {
            config: config.with_enabled(false),
            pipeline: Arc::new(pipeline),
            ticker: None,
        })
    }

    /// Current configuration. `enabled` reflects whether the ticker runs.
    pub fn config(&self) -> &PublisherConfig {
        &self.config
    }

    /// Aggregator read on every tick.
    pub fn aggregator(&self) -> &Arc<SampleAggregator> {
        &self.pipeline.aggregator
    }

    /// Current publisher status.
    pub fn status(&self) -> PublisherStatus {
        self.pipeline.tracker.status()
    }

    /// Subscribe to status changes.
    pub fn subscribe(&self) -> watch::Receiver<PublisherStatus> {
        self.pipeline.tracker.subscribe()
    }

    /// Whether the periodic ticker is active.
    pub fn is_ticking(&self) -> bool {
        self.ticker.is_some()
    }

    /// Start the transport and the ticker. A no-op when already enabled.
    ///
    /// On failure nothing is left running and the error is also recorded
    /// in the status.
    pub async fn enable(&mut self) -> Result<()> {
        if self.ticker.is_some() {
            return Ok(());
        }

        let config = self.config.with_enabled(true);
        self.pipeline
            .transport
            .lock()
            .await
            .start(config.clone())
            .await?;

        self.config = config;
        self.spawn_ticker();
        Ok(())
    }

    /// Stop the ticker, wait for the in-flight tick, then stop the transport.
    ///
    /// No frame is sent once this returns.
    pub async fn disable(&mut self) {
        self.stop_ticker().await;
        self.pipeline.transport.lock().await.stop();
        self.config = self.config.with_enabled(false);
    }

    /// Replace the configuration.
    ///
    /// Validation happens before anything changes. While running, a
    /// destination-only change keeps the socket; a new local bind recreates
    /// it; a new interval or frame layout restarts the ticker.
    pub async fn set_config(&mut self, config: PublisherConfig) -> Result<()> {
        config.validate()?;

        match (self.ticker.is_some(), config.enabled) {
            (false, false) => {
                self.config = config;
                Ok(())
            }
            (false, true) => {
                self.config = config.with_enabled(false);
                self.enable().await
            }
            (true, false) => {
                self.config = config;
                self.disable().await;
                Ok(())
            }
            (true, true) => self.reconfigure(config).await,
        }
    }

    async fn reconfigure(&mut self, config: PublisherConfig) -> Result<()> {
        let restart_ticker = self.config.send_interval_ms != config.send_interval_ms
            || self.config.encoder() != config.encoder();

        let result = self
            .pipeline
            .transport
            .lock()
            .await
            .reconfigure(config.clone())
            .await;

        if let Err(e) = result {
            tracing::error!(error = %e, "Reconfiguration failed, publishing halted");
            self.stop_ticker().await;
            self.config = config.with_enabled(false);
            return Err(e);
        }

        self.config = config;

        if restart_ticker {
            tracing::debug!(
                interval_ms = self.config.send_interval_ms,
                version = %self.config.wire_version,
                "Restarting ticker"
            );
            self.stop_ticker().await;
            self.spawn_ticker();
        }

        Ok(())
    }

    /// Run one tick immediately, outside the schedule.
    pub async fn tick_now(&self) -> TickOutcome {
        self.pipeline.tick(self.config.encoder()).await
    }

    /// Disable and consume the controller.
    pub async fn shutdown(mut self) -> PublisherStatus {
        self.disable().await;
        self.status()
    }

    fn spawn_ticker(&mut self) {
        let (shutdown, rx) = watch::channel(false);
        let pipeline = self.pipeline.clone();
        let interval = self.config.send_interval();
        let encoder = self.config.encoder();

        let handle = tokio::spawn(run_ticker(pipeline, interval, encoder, rx));
        self.ticker = Some(Ticker { shutdown, handle });
    }

    async fn stop_ticker(&mut self) {
        let Some(ticker) = self.ticker.take() else {
            return;
        };

        let _ = ticker.shutdown.send(true);
        if let Err(e) = ticker.handle.await
            && !e.is_cancelled()
        {
            tracing::warn!(error = %e, "Ticker task ended abnormally");
        }
    }
}

impl<T: Transport> Drop for PublisherController<T> {
    fn drop(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.handle.abort();
        }
    }
}

impl<T: Transport> Pipeline<T> {
    async fn tick(&self, encoder: FrameEncoder) -> TickOutcome {
        let Some(_guard) = TickGuard::acquire(&self.in_flight) else {
            self.tracker.record_skipped(1);
            tracing::debug!("Previous tick still in flight, skipping");
            return TickOutcome::Skipped;
        };

        let mut transport = self.transport.lock().await;
        if transport.status().state != PublisherState::Running {
            return TickOutcome::NotRunning;
        }

        let snapshot = self.aggregator.snapshot();
        match encoder.encode(&snapshot, snapshot.sequence) {
            Ok(frame) => {
                transport.send_frame(&frame).await;
                TickOutcome::Dispatched {
                    sequence: snapshot.sequence,
                    bytes: frame.len(),
                }
            }
            Err(e) => {
                tracing::warn!(sequence = snapshot.sequence, error = %e, "Dropping frame");
                self.tracker.record_dropped(e.to_string());
                TickOutcome::Dropped
            }
        }
    }
}

async fn run_ticker<T: Transport>(
    pipeline: Arc<Pipeline<T>>,
    interval: Duration,
    encoder: FrameEncoder,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticks = tokio::time::interval(interval);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::debug!(interval_ms = interval.as_millis() as u64, "Ticker started");

    let mut next_due: Option<Instant> = None;

    loop {
        tokio::select! {
            biased;

            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }

            deadline = ticks.tick() => {
                // Deadlines jumped over by the interval were dropped, not delayed.
                if let Some(expected) = next_due
                    && deadline > expected
                {
                    let skipped = ((deadline - expected).as_nanos() / interval.as_nanos()) as u64;
                    pipeline.tracker.record_skipped(skipped);
                    tracing::debug!(skipped, "Ticks skipped after an overrun");
                }
                next_due = Some(deadline + interval);

                let started = Instant::now();
                pipeline.tick(encoder).await;

                let elapsed = started.elapsed();
                if elapsed > interval {
                    tracing::debug!(
                        elapsed_ms = elapsed.as_millis() as u64,
                        interval_ms = interval.as_millis() as u64,
                        "Tick overran the send interval"
                    );
                }
            }
        }
    }

    tracing::debug!("Ticker stopped");
}
