//! Configuration and CLI argument handling

use std::time::Duration;

use clap::Parser;

/// CLI argument parsing structure
#[derive(Debug, Parser)]
#[command(name = "time-study-timer")]
#[command(about = "A state-managed timer service for manufacturing process time studies")]
#[command(version)]
pub struct Config {
    /// Port to bind the control API to
    #[arg(short, long, default_value = "20554")]
    pub port: u16,

    /// Host address to bind to
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Base URL of the time study backend API
    #[arg(short, long, default_value = "http://localhost:8080/api")]
    pub backend_url: String,

    /// Timeout for each backend call, in seconds
    #[arg(short = 't', long, default_value = "10")]
    pub remote_timeout: u64,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Config {
    /// Parse configuration from command line arguments
    pub fn parse() -> Self {
        Parser::parse()
    }

    /// Get the server address as a formatted string
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Get the appropriate log level based on verbose flag
    pub fn log_level(&self) -> &'static str {
        if self.verbose { "debug" } else { "info" }
    }

    /// Backend call timeout, never shorter than one second
    pub fn remote_timeout(&self) -> Duration {
        Duration::from_secs(self.remote_timeout.max(1))
    }
}
