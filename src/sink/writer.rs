use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{error, info};

use crate::sink::RecordSink;
use crate::state::CollectorState;
use crate::types::WindowSummary;

/// Receives window summaries from the flusher and persists them to the sink.
/// Runs on the blocking pool: file I/O never stalls the receive loop.
pub struct SinkWriter {
    sink: Box<dyn RecordSink>,
    records: mpsc::Receiver<WindowSummary>,
    state: Arc<CollectorState>,
}

impl SinkWriter {
    pub fn new(
        sink: Box<dyn RecordSink>,
        records: mpsc::Receiver<WindowSummary>,
        state: Arc<CollectorState>,
    ) -> Self {
        Self { sink, records, state }
    }

    /// Drain records until every sender is dropped, then close the sink.
    /// Must run outside the async workers (`spawn_blocking`).
    pub fn run(mut self) {
        while let Some(summary) = self.records.blocking_recv() {
            if let Err(e) = self.sink.append(&summary) {
                self.state.inc_sink_failures();
                error!("Sink write error, window record lost: {e}");
            }
        }

        if let Err(e) = self.sink.close() {
            error!("Failed to close record sink: {e}");
        }
        info!("Sink writer stopped");
    }
}
