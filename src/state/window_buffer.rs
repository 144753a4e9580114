use std::time::SystemTime;

use crate::types::DrainedWindow;

/// The live accumulation buffer for the current window.
///
/// Not synchronized on its own; `CollectorState` keeps it behind the same
/// lock as the counters so an append and its `total_requests` bump are one
/// critical section.
#[derive(Debug)]
pub struct WindowBuffer {
    samples: Vec<f64>,
    window_start: SystemTime,
}

impl WindowBuffer {
    pub fn new(window_start: SystemTime) -> Self {
        Self {
            samples: Vec::new(),
            window_start,
        }
    }

    #[inline]
    pub fn append(&mut self, sample_ms: f64) {
        self.samples.push(sample_ms);
    }

    /// Replace this buffer with an empty one opened at `now` and hand back the
    /// old contents. The previous allocation moves out with the samples, so
    /// the caller can process it after releasing the lock.
    pub fn drain(&mut self, now: SystemTime) -> DrainedWindow {
        let old = std::mem::replace(self, WindowBuffer::new(now));
        DrainedWindow {
            samples: old.samples,
            window_start: old.window_start,
            window_end: now,
        }
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    pub fn window_start(&self) -> SystemTime {
        self.window_start
    }
}
