//! Command line arguments
//!
//! Every flag is optional so that an unset flag leaves the configuration
//! file value in place.

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone, Default)]
#[command(name = "lanerouter")]
#[command(about = "Routes pub/sub messages by age and timestamp parity")]
#[command(version)]
pub struct Args {
    /// Configuration file path
    #[arg(short = 'c', long = "config-file", value_name = "FILE")]
    pub config_file: Option<PathBuf>,

    /// Topic to consume and republish to
    #[arg(short = 't', long = "topic", value_name = "TOPIC")]
    pub topic: Option<String>,

    /// Messages at least this old are dropped
    #[arg(short = 'a', long = "max-age-secs", value_name = "SECONDS")]
    pub max_age_secs: Option<u64>,

    /// Store backend
    #[arg(short = 's', long = "store", value_name = "KIND", value_parser = ["jsonl", "memory"])]
    pub store: Option<String>,

    /// Directory for the jsonl store
    #[arg(short = 'd', long = "store-path", value_name = "DIR")]
    pub store_path: Option<PathBuf>,

    /// Demo sender interval in milliseconds (0 disables the sender)
    #[arg(short = 'i', long = "send-interval-ms", value_name = "MS")]
    pub send_interval_ms: Option<u64>,

    /// Number of demo messages to send (0 sends until shutdown)
    #[arg(short = 'n', long = "send-count", value_name = "COUNT")]
    pub send_count: Option<u64>,

    /// Log level
    #[arg(short = 'l', long = "log-level", value_name = "LEVEL", value_parser = ["trace", "debug", "info", "warn", "error", "off"])]
    pub log_level: Option<String>,

    /// Log output format
    #[arg(short = 'o', long = "log-format", value_name = "FORMAT", value_parser = ["text", "simple", "ext", "json"])]
    pub log_format: Option<String>,

    /// Log file path (use 'none' to log to stderr)
    #[arg(short = 'f', long = "log-file", value_name = "FILE")]
    pub log_file: Option<String>,

    /// Force colored output
    #[arg(short = 'g', long = "color", conflicts_with = "no_color")]
    pub color: bool,

    /// Disable colored output
    #[arg(short = 'G', long = "no-color")]
    pub no_color: bool,
}

impl Args {
    pub fn parse_from_env() -> Self {
        Self::parse()
    }

    /// Explicit color choice, `None` when neither flag was given
    pub fn color_choice(&self) -> Option<bool> {
        match (self.color, self.no_color) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        }
    }
}
