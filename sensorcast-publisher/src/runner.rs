//! Publisher runner for lifecycle management.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use sensorcast_common::init_tracing;

use crate::PublisherArgs;
use crate::aggregator::{ReadingSink, SampleAggregator};
use crate::config::AppConfig;
use crate::controller::PublisherController;
use crate::error::{PublisherError, Result};
use crate::status::{PublisherStatus, StatusReport};

/// How long workers get to finish after the shutdown signal.
const WORKER_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Runner that manages the lifecycle of a publisher process.
///
/// Handles:
/// - Logging initialization
/// - Aggregator and controller construction
/// - Worker task spawning and shutdown
/// - Periodic status logging
/// - Graceful shutdown on Ctrl+C or SIGTERM
///
/// # Example
///
/// ```ignore
/// use sensorcast_publisher::{AppConfig, PublisherArgs, PublisherRunner};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let args = PublisherArgs::parse_with_default("sensorcast.json5");
///     let config = MyConfig::load(&args.config)?;
///
///     let mut runner = PublisherRunner::new("sensorcast", config, Some(&args))?;
///
///     let sink = runner.sink();
///     let shutdown = runner.shutdown_signal();
///     runner.spawn(my_source(sink, shutdown));
///
///     runner.run().await
/// }
/// ```
pub struct PublisherRunner<C: AppConfig> {
    name: String,
    version: String,
    config: C,
    aggregator: Arc<SampleAggregator>,
    controller: PublisherController,
    status_interval: Option<Duration>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl<C: AppConfig> PublisherRunner<C> {
    /// Create a runner and initialize logging.
    ///
    /// CLI arguments, when given, override the configured log level and format.
    pub fn new(name: impl Into<String>, config: C, args: Option<&PublisherArgs>) -> Result<Self> {
        let logging = match args {
            Some(args) => args.logging(config.logging()),
            None => config.logging().clone(),
        };

        init_tracing(&logging)
            .map_err(|e| PublisherError::with_context("Failed to initialize logging", e))?;

        Self::from_config(name, config)
    }

    /// Create a runner without touching the global tracing subscriber.
    pub fn from_config(name: impl Into<String>, config: C) -> Result<Self> {
        let name = name.into();
        let version = env!("CARGO_PKG_VERSION").to_string();

        let aggregator = Arc::new(SampleAggregator::new());
        let controller = PublisherController::new(config.publisher().clone(), aggregator.clone())?;
        let (shutdown_tx, _) = watch::channel(false);
        let status_interval = config.status_interval().filter(|i| !i.is_zero());

        tracing::info!(service = %name, version = %version, "Starting publisher");

        Ok(Self {
            name,
            version,
            config,
            aggregator,
            controller,
            status_interval,
            shutdown_tx,
            tasks: Vec::new(),
        })
    }

    /// Log the publisher status at a fixed interval while running.
    pub fn with_status_interval(mut self, interval: Duration) -> Self {
        self.status_interval = (!interval.is_zero()).then_some(interval);
        self
    }

    /// Service name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Service version.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Loaded configuration.
    pub fn config(&self) -> &C {
        &self.config
    }

    /// Aggregator shared by sources and the controller.
    pub fn aggregator(&self) -> Arc<SampleAggregator> {
        self.aggregator.clone()
    }

    /// Aggregator as a reading sink for sources.
    pub fn sink(&self) -> Arc<dyn ReadingSink> {
        self.aggregator.clone()
    }

    /// Receiver that flips to `true` when the runner shuts down.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    /// Current publisher status.
    pub fn status(&self) -> PublisherStatus {
        self.controller.status()
    }

    /// Spawn a worker task.
    ///
    /// Workers should exit on [`shutdown_signal`](Self::shutdown_signal);
    /// stragglers are aborted after a grace period.
    pub fn spawn<F>(&mut self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tasks.push(tokio::spawn(future));
    }

    /// Spawn a worker task that returns a Result.
    ///
    /// Errors are logged automatically.
    pub fn spawn_with_error<F, E>(&mut self, name: impl Into<String>, future: F)
    where
        F: Future<Output = std::result::Result<(), E>> + Send + 'static,
        E: std::fmt::Display + Send + 'static,
    {
        let name = name.into();
        self.tasks.push(tokio::spawn(async move {
            if let Err(e) = future.await {
                tracing::error!(worker = %name, error = %e, "Worker failed");
            }
        }));
    }

    /// Run until Ctrl+C or SIGTERM is received.
    pub async fn run(self) -> Result<()> {
        self.run_until(shutdown_requested()).await.map(|_| ())
    }

    /// Run until `shutdown` completes, returning the final status.
    ///
    /// This will:
    /// 1. Enable publishing if the config asks for it
    /// 2. Wait for `shutdown`
    /// 3. Signal workers and stop the controller
    /// 4. Log the final statistics
    pub async fn run_until<S>(mut self, shutdown: S) -> Result<PublisherStatus>
    where
        S: Future<Output = ()>,
    {
        if self.config.publisher().enabled {
            if let Err(e) = self.controller.enable().await {
                tracing::error!(error = %e, "Failed to start publishing");
                self.stop_workers().await;
                return Err(e);
            }
        } else {
            tracing::info!("Publishing disabled in configuration");
        }

        self.log_report(StatusReport::from_status(
            &self.name,
            &self.version,
            &self.controller.status(),
        ));

        if let Some(interval) = self.status_interval {
            let task = status_logger(self.controller.subscribe(), interval, self.shutdown_signal());
            self.tasks.push(tokio::spawn(task));
        }

        tracing::info!(
            service = %self.name,
            tasks = self.tasks.len(),
            "Publisher running. Press Ctrl+C to stop."
        );

        shutdown.await;

        tracing::info!(service = %self.name, "Received shutdown signal");

        let status = self.controller.shutdown().await;
        stop_tasks(self.shutdown_tx, self.tasks).await;
        let (name, version) = (self.name, self.version);

        tracing::info!(
            frames_sent = status.frames_sent,
            send_failures = status.send_failures,
            frames_dropped = status.frames_dropped,
            ticks_skipped = status.ticks_skipped,
            "Final statistics"
        );

        let offline = StatusReport::offline(&name, &version).with_metadata(serde_json::json!({
            "frames_sent": status.frames_sent,
        }));
        if let Ok(json) = offline.to_json() {
            tracing::info!(report = %json, "Status");
        }

        tracing::info!(service = %name, "Goodbye!");

        Ok(status)
    }

    async fn stop_workers(&mut self) {
        let tasks = std::mem::take(&mut self.tasks);
        let (tx, _) = watch::channel(false);
        let shutdown_tx = std::mem::replace(&mut self.shutdown_tx, tx);
        stop_tasks(shutdown_tx, tasks).await;
    }

    fn log_report(&self, report: StatusReport) {
        match report.to_json() {
            Ok(json) => tracing::info!(report = %json, "Status"),
            Err(e) => tracing::warn!(error = %e, "Failed to serialize status report"),
        }
    }
}

async fn stop_tasks(shutdown_tx: watch::Sender<bool>, tasks: Vec<JoinHandle<()>>) {
    let _ = shutdown_tx.send(true);

    let aborts: Vec<_> = tasks.iter().map(|t| t.abort_handle()).collect();
    let joined = tokio::time::timeout(WORKER_GRACE_PERIOD, async {
        for task in tasks {
            let _ = task.await;
        }
    })
    .await;

    if joined.is_err() {
        tracing::warn!("Workers did not stop in time, aborting");
        for abort in aborts {
            abort.abort();
        }
    }
}

async fn status_logger(
    status: watch::Receiver<PublisherStatus>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticks = tokio::time::interval(interval);
    // Skip the immediate first tick; startup is already logged.
    ticks.tick().await;

    loop {
        tokio::select! {
            _ = ticks.tick() => {
                let current = status.borrow().clone();
                tracing::info!(
                    state = %current.state,
                    frames_sent = current.frames_sent,
                    send_failures = current.send_failures,
                    frames_dropped = current.frames_dropped,
                    ticks_skipped = current.ticks_skipped,
                    destination = current.destination.as_deref().unwrap_or("-"),
                    "Publisher status"
                );
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}

async fn shutdown_requested() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C");
        }
        _ = terminate() => {
            tracing::info!("Received SIGTERM");
        }
    }
}

#[cfg(unix)]
async fn terminate() {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            tracing::warn!(error = %e, "Failed to install SIGTERM handler");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await;
}

/// Convenience function to run a publisher with minimal boilerplate.
///
/// # Example
///
/// ```ignore
/// use sensorcast_publisher::run_publisher;
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     run_publisher::<MyConfig, _>("sensorcast", "sensorcast.json5", |runner| {
///         let sink = runner.sink();
///         let shutdown = runner.shutdown_signal();
///         runner.spawn(my_source(sink, shutdown));
///         Ok(())
///     })
///     .await
/// }
/// ```
pub async fn run_publisher<C, F>(
    name: &str,
    default_config: &'static str,
    setup: F,
) -> anyhow::Result<()>
where
    C: AppConfig,
    F: FnOnce(&mut PublisherRunner<C>) -> anyhow::Result<()>,
{
    let args = PublisherArgs::parse_with_default(default_config);
    let config = C::load(&args.config)?;

    let mut runner = PublisherRunner::new(name, config, Some(&args))?;
    setup(&mut runner)?;

    runner.run().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PublisherConfig;
    use sensorcast_common::{Channel, LoggingConfig, Reading};
    use serde::Deserialize;

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

    #[tokio::test]
    async fn test_disabled_runner_shuts_down_workers() {
        let config = TestConfig {
            publisher: PublisherConfig::default(),
            logging: LoggingConfig::default(),
        };
        let mut runner = PublisherRunner::from_config("test", config).unwrap();

        let sink = runner.sink();
        let mut shutdown = runner.shutdown_signal();
        runner.spawn(async move {
            sink.record(Reading::new(Channel::GyroX, 1.0, 1));
            let _ = shutdown.changed().await;
        });
        let aggregator = runner.aggregator();

        let status = runner
            .run_until(tokio::time::sleep(Duration::from_millis(20)))
            .await
            .unwrap();

        assert!(!status.is_running());
        assert_eq!(status.frames_sent, 0);
        assert_eq!(aggregator.present_channels(), vec![Channel::GyroX]);
    }

    #[tokio::test]
    async fn test_worker_errors_are_contained() {
        let config = TestConfig {
            publisher: PublisherConfig::default(),
            logging: LoggingConfig::default(),
        };
        let mut runner = PublisherRunner::from_config("test", config)
            .unwrap()
            .with_status_interval(Duration::from_millis(5));

        runner.spawn_with_error("failing", async { Err::<(), _>("boom") });

        let result = runner
            .run_until(tokio::time::sleep(Duration::from_millis(20)))
            .await;
        assert!(result.is_ok());
    }

    #[test]
    fn test_invalid_publisher_config_is_rejected() {
        let config = TestConfig {
            publisher: PublisherConfig {
                send_interval_ms: 1,
                ..Default::default()
            },
            logging: LoggingConfig::default(),
        };

        assert!(matches!(
            PublisherRunner::from_config("test", config),
            Err(PublisherError::InvalidConfig(_))
        ));
    }
}
