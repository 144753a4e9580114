use std::sync::{Arc, Mutex, PoisonError};
use std::time::SystemTime;

use tokio::sync::mpsc;
use tracing::{error, info};

use crate::state::CollectorState;
use crate::stats::calculator::summarize;
use crate::stats::LifetimeStats;
use crate::types::{thousands, WindowSummary};

/// Runs one flush cycle: swap the live buffer, summarize, hand off, report.
/// Shared by the periodic scheduler and the shutdown path.
pub struct Flusher {
    state: Arc<CollectorState>,
    /// None once the sink writer has been told to finish.
    records: Mutex<Option<mpsc::Sender<WindowSummary>>>,
    lifetime: LifetimeStats,
}

impl Flusher {
    pub fn new(state: Arc<CollectorState>, records: mpsc::Sender<WindowSummary>) -> Self {
        Self {
            state,
            records: Mutex::new(Some(records)),
            lifetime: LifetimeStats::new(),
        }
    }

    /// Close out the current window. Returns None when the window was empty;
    /// nothing is written or counted in that case.
    ///
    /// The record is queued for the sink writer and never written here. A
    /// record the queue cannot take is logged and counted as a sink failure:
    /// the window loses its durable row, not its status line.
    pub fn flush(&self) -> Option<WindowSummary> {
        let drained = self.state.drain(SystemTime::now());
        // Lock released: everything below runs off the hot path.
        let summary = summarize(&drained)?;
        self.lifetime.record_all(&drained.samples);
        self.enqueue(summary.clone());

        let index = self.state.complete_window();
        log_window(index, &summary);
        Some(summary)
    }

    pub fn lifetime(&self) -> &LifetimeStats {
        &self.lifetime
    }

    /// Drop the record sender so the sink writer drains its queue and exits.
    pub fn close_records(&self) {
        self.records().take();
    }

    fn enqueue(&self, summary: WindowSummary) {
        let queued = match self.records().as_ref() {
            Some(tx) => tx.try_send(summary).map_err(|e| e.to_string()),
            None => Err("sink writer already closed".to_string()),
        };
        if let Err(e) = queued {
            self.state.inc_sink_failures();
            error!("Sink queue error, window record lost: {e}");
        }
    }

    fn records(&self) -> std::sync::MutexGuard<'_, Option<mpsc::Sender<WindowSummary>>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn log_window(index: u64, s: &WindowSummary) {
    let start = s.start_label();
    info!(
        event = "WINDOW_FLUSH",
        window = index,
        count = s.count,
        throughput_rps = s.throughput_rps,
        avg_ms = s.mean_ms,
        p99_ms = s.p99_ms,
        "[Win {:3}] {} | Reqs: {:>9} ({:7.1} req/s) | Avg: {:7.2}ms | P90: {:7.2}ms | P95: {:7.2}ms | P99: {:7.2}ms | Max: {:7.2}ms",
        index,
        start,
        thousands(s.count as u64),
        s.throughput_rps,
        s.mean_ms,
        s.p90_ms,
        s.p95_ms,
        s.p99_ms,
        s.max_ms,
    );
}
