mod collector;
mod config;
mod error;
mod ingest;
mod scheduler;
mod sink;
mod state;
mod stats;
mod types;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::collector::Collector;
use crate::config::{Cli, Config};
use crate::error::Result;
use crate::types::{thousands, ShutdownReport};

#[tokio::main]
async fn main() {
    let cfg = Config::from_cli(Cli::parse());

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    info!("Streaming Latency Collector");
    info!(
        port = cfg.port,
        window_s = cfg.window.as_secs(),
        output = %cfg.output.display(),
        "Port: {} | Window size: {}s | Output: {}",
        cfg.port,
        cfg.window.as_secs(),
        cfg.output.display(),
    );

    let collector = Collector::start(cfg)?;
    let addr = collector.local_addr()?;
    info!("Listening on UDP {addr}, ready to receive latency stream. Press Ctrl+C to stop");

    let report = collector.run(shutdown_signal()).await?;
    log_report(&report);
    Ok(())
}

/// Resolves on Ctrl+C, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {e}");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

fn log_report(r: &ShutdownReport) {
    info!(
        event = "SUMMARY",
        total_requests = r.total_requests,
        total_windows = r.total_windows,
        sink_failures = r.sink_failures,
        "Summary | Total requests: {} | Total windows: {} | Output file: {}",
        thousands(r.total_requests),
        thousands(r.total_windows),
        r.sink_location,
    );
    if r.sink_failures > 0 {
        error!("{} window record(s) could not be written to {}", r.sink_failures, r.sink_location);
    }
    if let Some(l) = r.lifetime {
        info!(
            samples = l.samples,
            "Lifetime latency | P50: {:.2}ms | P99: {:.2}ms | Max: {:.2}ms",
            l.p50_ms,
            l.p99_ms,
            l.max_ms,
        );
    }
}
