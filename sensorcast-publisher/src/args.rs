//! CLI argument parsing for the publisher.

use std::path::PathBuf;

use clap::Parser;

use sensorcast_common::{LogFormat, LoggingConfig};

/// Common CLI arguments for publisher binaries.
#[derive(Parser, Debug, Clone)]
#[command(about = "SensorCast telemetry publisher")]
pub struct PublisherArgs {
    /// Path to configuration file.
    #[arg(short, long)]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override log format (text, json).
    #[arg(long)]
    pub log_format: Option<LogFormat>,
}

impl PublisherArgs {
    /// Parse CLI arguments with a default config path.
    ///
    /// If no `--config` argument is provided, uses the default.
    pub fn parse_with_default(default_config: &'static str) -> Self {
        let command = <Self as clap::CommandFactory>::command()
            .mut_arg("config", |arg| arg.default_value(default_config));
        let matches = command.clone().get_matches();

        <Self as clap::FromArgMatches>::from_arg_matches(&matches)
            .unwrap_or_else(|e| e.with_cmd(&command).exit())
    }

    /// Parse CLI arguments (requires --config to be specified).
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }

    /// Apply the CLI overrides on top of the configured logging.
    pub fn logging(&self, configured: &LoggingConfig) -> LoggingConfig {
        LoggingConfig {
            level: self
                .log_level
                .clone()
                .unwrap_or_else(|| configured.level.clone()),
            format: self.log_format.unwrap_or(configured.format),
        }
    }
}
