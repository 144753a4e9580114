//! Process-lifetime latency histogram.
//! Fed by the flusher with every drained sample, read once for the shutdown report.
//! Per-window statistics are computed exactly elsewhere; this is only the coarse
//! all-time view.

use std::sync::{Mutex, MutexGuard, PoisonError};

use hdrhistogram::Histogram;

use crate::config::MAX_LATENCY_MS;
use crate::types::LifetimeLatency;

/// Values stored in microseconds.
pub struct LifetimeStats {
    inner: Mutex<Option<Histogram<u64>>>,
}

impl LifetimeStats {
    /// Tracks 1us to the rejection bound (60s), 3 significant figures.
    pub fn new() -> Self {
        let upper_us = (MAX_LATENCY_MS * 1_000.0) as u64;
        Self {
            inner: Mutex::new(Histogram::new_with_bounds(1, upper_us, 3).ok()),
        }
    }

    /// Record a batch of millisecond samples.
    pub fn record_all(&self, samples_ms: &[f64]) {
        let mut guard = self.histogram();
        let Some(h) = guard.as_mut() else {
            return;
        };
        for &ms in samples_ms {
            // Sub-microsecond samples still count, in the lowest bucket.
            let us = ((ms * 1_000.0).round() as u64).max(1);
            h.saturating_record(us);
        }
    }

    /// None if nothing was recorded.
    pub fn snapshot(&self) -> Option<LifetimeLatency> {
        let guard = self.histogram();
        let h = guard.as_ref()?;
        if h.is_empty() {
            return None;
        }
        Some(LifetimeLatency {
            samples: h.len(),
            p50_ms: h.value_at_quantile(0.5) as f64 / 1_000.0,
            p99_ms: h.value_at_quantile(0.99) as f64 / 1_000.0,
            max_ms: h.max() as f64 / 1_000.0,
        })
    }

    // A panic mid-record leaves at worst one batch partially counted.
    fn histogram(&self) -> MutexGuard<'_, Option<Histogram<u64>>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for LifetimeStats {
    fn default() -> Self {
        Self::new()
    }
}
