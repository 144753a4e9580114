use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Local};

// ---------------------------------------------------------------------------
// Drained window — handed from the state lock to the flusher
// ---------------------------------------------------------------------------

/// Samples captured by one atomic swap of the live buffer.
#[derive(Debug, Clone)]
pub struct DrainedWindow {
    pub samples: Vec<f64>,
    pub window_start: SystemTime,
    /// Swap time.
    pub window_end: SystemTime,
}

impl DrainedWindow {
    /// Wall-clock length of the window. A backwards clock step yields 0.
    pub fn duration_secs(&self) -> f64 {
        self.window_end
            .duration_since(self.window_start)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0)
    }
}

// ---------------------------------------------------------------------------
// WindowSummary — immutable, one per flushed window
// ---------------------------------------------------------------------------

/// Statistics for one completed window. Latencies in milliseconds.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowSummary {
    pub window_start: SystemTime,
    pub window_end: SystemTime,
    pub duration_s: f64,
    pub count: usize,
    pub throughput_rps: f64,
    pub mean_ms: f64,
    pub min_ms: f64,
    pub p50_ms: f64,
    pub p90_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub max_ms: f64,
    pub stdev_ms: f64,
}

impl WindowSummary {
    /// Window end as fractional seconds since the Unix epoch.
    pub fn end_epoch_secs(&self) -> f64 {
        epoch_secs(self.window_end)
    }

    pub fn start_label(&self) -> String {
        local_label(self.window_start)
    }

    pub fn end_label(&self) -> String {
        local_label(self.window_end)
    }
}

// ---------------------------------------------------------------------------
// Final report
// ---------------------------------------------------------------------------

/// Lifetime percentiles from the process-wide histogram, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LifetimeLatency {
    pub samples: u64,
    pub p50_ms: f64,
    pub p99_ms: f64,
    pub max_ms: f64,
}

#[derive(Debug, Clone)]
pub struct ShutdownReport {
    pub total_requests: u64,
    pub total_windows: u64,
    pub sink_failures: u64,
    pub sink_location: String,
    /// None if no sample was ever flushed.
    pub lifetime: Option<LifetimeLatency>,
}

pub fn epoch_secs(t: SystemTime) -> f64 {
    t.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}

/// `YYYY-MM-DD HH:MM:SS` in local time.
pub fn local_label(t: SystemTime) -> String {
    DateTime::<Local>::from(t).format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Count with comma thousands separators: `1234567` -> `1,234,567`.
pub fn thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn duration_is_zero_when_clock_steps_back() {
        let now = SystemTime::now();
        let w = DrainedWindow {
            samples: vec![1.0],
            window_start: now,
            window_end: now - Duration::from_secs(3),
        };
        assert_eq!(w.duration_secs(), 0.0);
    }

    #[test]
    fn duration_measures_wall_clock() {
        let start = UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        let w = DrainedWindow {
            samples: Vec::new(),
            window_start: start,
            window_end: start + Duration::from_millis(5_020),
        };
        assert!((w.duration_secs() - 5.02).abs() < 1e-9);
    }

    #[test]
    fn label_has_second_precision() {
        let label = local_label(UNIX_EPOCH + Duration::from_secs(1_700_000_000));
        assert_eq!(label.len(), "YYYY-MM-DD HH:MM:SS".len());
        assert_eq!(&label[4..5], "-");
        assert_eq!(&label[10..11], " ");
    }

    #[test]
    fn thousands_groups_digits() {
        assert_eq!(thousands(0), "0");
        assert_eq!(thousands(999), "999");
        assert_eq!(thousands(1_000), "1,000");
        assert_eq!(thousands(12_345), "12,345");
        assert_eq!(thousands(1_234_567), "1,234,567");
        assert_eq!(thousands(u64::MAX), "18,446,744,073,709,551,615");
    }
}
