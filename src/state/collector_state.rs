use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;

use crate::state::WindowBuffer;
use crate::types::DrainedWindow;

/// Everything guarded by the single collector lock.
#[derive(Debug)]
struct Ledger {
    buffer: WindowBuffer,
    total_requests: u64,
    total_windows: u64,
}

/// Process-wide collector context shared by the receiver, the scheduler and
/// the shutdown path.
///
/// One mutex covers the live buffer and both counters. Critical sections are
/// a single append or a single buffer swap; statistics and sink writes happen
/// after the guard is dropped.
pub struct CollectorState {
    ledger: Mutex<Ledger>,
    running: AtomicBool,
    sink_failures: AtomicU64,
}

impl CollectorState {
    pub fn new(started_at: SystemTime) -> Arc<Self> {
        Arc::new(Self {
            ledger: Mutex::new(Ledger {
                buffer: WindowBuffer::new(started_at),
                total_requests: 0,
                total_windows: 0,
            }),
            running: AtomicBool::new(true),
            sink_failures: AtomicU64::new(0),
        })
    }

    /// Every critical section leaves the ledger consistent, so a poisoned
    /// lock is still safe to use.
    fn ledger(&self) -> MutexGuard<'_, Ledger> {
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append an accepted sample and count it.
    pub fn record(&self, sample_ms: f64) {
        let mut ledger = self.ledger();
        ledger.buffer.append(sample_ms);
        ledger.total_requests += 1;
    }

    /// Atomically swap out the live buffer. The new buffer opens at `now`.
    pub fn drain(&self, now: SystemTime) -> DrainedWindow {
        self.ledger().buffer.drain(now)
    }

    /// Count an emitted summary and return its 1-based window index.
    pub fn complete_window(&self) -> u64 {
        let mut ledger = self.ledger();
        ledger.total_windows += 1;
        ledger.total_windows
    }

    pub fn total_requests(&self) -> u64 {
        self.ledger().total_requests
    }

    pub fn total_windows(&self) -> u64 {
        self.ledger().total_windows
    }

    /// Sample count and open time of the live buffer.
    pub fn live_window(&self) -> (usize, SystemTime) {
        let ledger = self.ledger();
        (ledger.buffer.sample_count(), ledger.buffer.window_start())
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Cooperative cancellation: both loops poll this flag.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    pub fn inc_sink_failures(&self) {
        self.sink_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn sink_failures(&self) -> u64 {
        self.sink_failures.load(Ordering::Relaxed)
    }
}
