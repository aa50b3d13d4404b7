//! SensorCast listener.
//!
//! Receives frames from a publisher and logs their contents.

use anyhow::Result;
use clap::Parser;
use tokio::sync::{mpsc, watch};

use sensorcast::FrameListener;
use sensorcast_common::{LogFormat, LoggingConfig, init_tracing};

/// Receive and decode SensorCast frames.
#[derive(Parser, Debug)]
#[command(name = "sensorcast-listen", version, about)]
struct ListenArgs {
    /// Address to listen on.
    #[arg(short, long, default_value = "0.0.0.0:5005")]
    bind: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log format (text, json).
    #[arg(long, default_value = "text")]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = ListenArgs::parse();

    init_tracing(&LoggingConfig {
        level: args.log_level.clone(),
        format: args.log_format,
    })?;

    let listener = FrameListener::bind(&args.bind).await?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (tx, mut rx) = mpsc::channel(1024);

    let listener_task = tokio::spawn(listener.run(tx, shutdown_rx));

    let printer = tokio::spawn(async move {
        while let Some(received) = rx.recv().await {
            let frame = &received.frame;
            let values: Vec<String> = frame
                .values
                .iter()
                .map(|(channel, value)| format!("{}={:.4}", channel, value))
                .collect();

            tracing::info!(
                from = %received.from,
                sequence = frame.sequence,
                version = %frame.version,
                timestamp = ?frame.timestamp,
                values = %values.join(" "),
                "Frame"
            );
        }
    });

    tokio::signal::ctrl_c().await?;
    tracing::info!("Received Ctrl+C, shutting down...");

    shutdown_tx.send(true)?;
    let stats = listener_task.await?;
    let _ = printer.await;

    tracing::info!(
        datagrams = stats.datagrams,
        frames = stats.frames,
        decode_failures = stats.decode_failures,
        sequence_gaps = stats.sequence_gaps,
        missed_frames = stats.missed_frames,
        late_frames = stats.late_frames,
        "Final statistics"
    );

    Ok(())
}
