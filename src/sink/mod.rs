//! Durable destination for completed window summaries.

pub mod csv;
pub mod writer;

pub use self::csv::CsvFileSink;
pub use self::writer::SinkWriter;

use crate::error::Result;
use crate::types::WindowSummary;

/// Append-only store of one record per flushed window.
///
/// Driven only by `SinkWriter` on the blocking pool, so a slow sink delays
/// neither the receiver nor the next flush.
pub trait RecordSink: Send {
    fn append(&mut self, summary: &WindowSummary) -> Result<()>;

    /// Human-readable location for the shutdown report.
    fn location(&self) -> String;

    /// Flush and release the underlying handle.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}
