use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{AppError, Result};
use crate::sink::RecordSink;
use crate::types::WindowSummary;

pub const HEADER_COLUMNS: [&str; 14] = [
    "timestamp",
    "window_start",
    "window_end",
    "duration_s",
    "count",
    "throughput_rps",
    "avg_ms",
    "min_ms",
    "p50_ms",
    "p90_ms",
    "p95_ms",
    "p99_ms",
    "max_ms",
    "stdev_ms",
];

/// Comma-separated window log. The header is written once at creation,
/// truncating any previous file; rows are appended and flushed one per window.
pub struct CsvFileSink {
    path: PathBuf,
    writer: csv::Writer<File>,
}

impl CsvFileSink {
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let sink_err = |e: String| AppError::Sink(format!("{}: {e}", path.display()));

        {
            let mut header = csv::Writer::from_path(&path).map_err(|e| sink_err(e.to_string()))?;
            header.write_record(HEADER_COLUMNS).map_err(|e| sink_err(e.to_string()))?;
            header.flush().map_err(|e| sink_err(e.to_string()))?;
        }

        let file = OpenOptions::new()
            .append(true)
            .open(&path)
            .map_err(|e| sink_err(e.to_string()))?;
        info!("Record sink ready at {}", path.display());

        Ok(Self {
            writer: csv::Writer::from_writer(file),
            path,
        })
    }
}

impl RecordSink for CsvFileSink {
    fn append(&mut self, summary: &WindowSummary) -> Result<()> {
        self.writer.write_record(format_record(summary))?;
        // One flush per row: a crash loses at most the window being written.
        self.writer.flush()?;
        Ok(())
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }

    fn close(&mut self) -> Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        Ok(())
    }
}

/// One record in `HEADER_COLUMNS` order, each field at its fixed precision.
pub fn format_record(s: &WindowSummary) -> [String; 14] {
    [
        format!("{:.3}", s.end_epoch_secs()),
        s.start_label(),
        s.end_label(),
        format!("{:.2}", s.duration_s),
        s.count.to_string(),
        format!("{:.2}", s.throughput_rps),
        format!("{:.3}", s.mean_ms),
        format!("{:.3}", s.min_ms),
        format!("{:.3}", s.p50_ms),
        format!("{:.3}", s.p90_ms),
        format!("{:.3}", s.p95_ms),
        format!("{:.3}", s.p99_ms),
        format!("{:.3}", s.max_ms),
        format!("{:.3}", s.stdev_ms),
    ]
}
