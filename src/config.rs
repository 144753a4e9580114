use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::error::{AppError, Result};

/// UDP port the collector listens on when `--port` is not given.
pub const DEFAULT_PORT: u16 = 9999;

/// Window length in seconds when `--window` is not given.
pub const DEFAULT_WINDOW_SECS: u64 = 5;

/// CSV file written when `--output` is not given.
pub const DEFAULT_OUTPUT: &str = "latencies_stream.csv";

/// Largest datagram payload read per receive. Longer payloads are truncated by the kernel.
pub const MAX_PAYLOAD_BYTES: usize = 64;

/// Samples must be strictly greater than this (milliseconds).
pub const MIN_LATENCY_MS: f64 = 0.0;

/// Samples must be strictly below this (milliseconds). Catches seconds-as-ms bugs.
pub const MAX_LATENCY_MS: f64 = 60_000.0;

/// Requested SO_RCVBUF. Bursts beyond this are dropped by the kernel.
pub const RECV_BUFFER_BYTES: usize = 2 * 1024 * 1024;

/// Bounded wait on each receive so the loop re-checks the running flag.
pub const RECV_TIMEOUT: Duration = Duration::from_secs(1);

/// How often the scheduler re-checks the running flag while waiting for its next tick.
pub const STATE_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Window records queued for the sink writer before further records are dropped.
pub const SINK_QUEUE_CAPACITY: usize = 1024;

/// Extra time granted on top of the receive timeout before shutdown stops waiting for tasks.
pub const SHUTDOWN_GRACE_MARGIN: Duration = Duration::from_secs(1);

#[derive(Parser, Debug)]
#[command(name = "collector", about = "Streaming latency collector")]
pub struct Cli {
    /// UDP port to listen on.
    #[arg(long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Window size in seconds.
    #[arg(long, default_value_t = DEFAULT_WINDOW_SECS, value_parser = clap::value_parser!(u64).range(1..))]
    pub window: u64,

    /// Output CSV file.
    #[arg(long, default_value = DEFAULT_OUTPUT)]
    pub output: PathBuf,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_ip: IpAddr,
    pub port: u16,
    pub window: Duration,
    pub output: PathBuf,
    pub recv_timeout: Duration,
    pub recv_buffer_bytes: usize,
    /// tracing filter directive (LOG_LEVEL)
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            window: Duration::from_secs(DEFAULT_WINDOW_SECS),
            output: PathBuf::from(DEFAULT_OUTPUT),
            recv_timeout: RECV_TIMEOUT,
            recv_buffer_bytes: RECV_BUFFER_BYTES,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    pub fn from_cli(cli: Cli) -> Self {
        Self {
            port: cli.port,
            window: Duration::from_secs(cli.window),
            output: cli.output,
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            ..Self::default()
        }
    }

    /// Checked once, when the collector is built.
    pub fn validate(&self) -> Result<()> {
        if self.window.is_zero() {
            return Err(AppError::Config("window must be at least one second".to_string()));
        }
        if self.recv_timeout.is_zero() {
            return Err(AppError::Config("receive timeout must be non-zero".to_string()));
        }
        Ok(())
    }

    /// How long shutdown waits for the receiver and scheduler to notice the stop flag.
    pub fn shutdown_grace(&self) -> Duration {
        self.recv_timeout.max(STATE_POLL_INTERVAL) + SHUTDOWN_GRACE_MARGIN
    }
}
