use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::config::STATE_POLL_INTERVAL;
use crate::scheduler::Flusher;
use crate::state::CollectorState;

/// Fires one flush per window length until the running flag clears.
/// The final partial-window flush belongs to the shutdown path, not here.
pub struct WindowScheduler {
    state: Arc<CollectorState>,
    flusher: Arc<Flusher>,
    window: Duration,
    poll: Duration,
}

impl WindowScheduler {
    pub fn new(state: Arc<CollectorState>, flusher: Arc<Flusher>, window: Duration) -> Self {
        Self {
            state,
            flusher,
            window,
            poll: STATE_POLL_INTERVAL.min(window),
        }
    }

    pub async fn run(self) {
        // First boundary one full window after start.
        let mut interval = interval_at(Instant::now() + self.window, self.window);
        // A late tick shifts later windows instead of bursting.
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while self.state.is_running() {
            // interval.tick() is cancel-safe, so a poll timeout loses nothing.
            if tokio::time::timeout(self.poll, interval.tick()).await.is_err() {
                continue;
            }
            if !self.state.is_running() {
                break;
            }
            if self.flusher.flush().is_none() {
                debug!("Window closed with no samples, nothing emitted");
            }
        }

        info!("Window scheduler stopped");
    }
}
