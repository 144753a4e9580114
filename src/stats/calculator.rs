use crate::types::{DrainedWindow, WindowSummary};

/// Summarize a drained window. Returns None for an empty window so the caller
/// skips emission instead of writing NaN statistics.
///
/// Samples are sorted before any arithmetic, which makes every field a pure
/// function of the sample multiset (floating-point sums included).
pub fn summarize(window: &DrainedWindow) -> Option<WindowSummary> {
    if window.samples.is_empty() {
        return None;
    }

    let mut sorted = window.samples.clone();
    sorted.sort_unstable_by(f64::total_cmp);

    let count = sorted.len();
    let n = count as f64;
    let mean = sorted.iter().sum::<f64>() / n;
    // Population variance: divide by N.
    let variance = sorted.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;

    let duration_s = window.duration_secs();
    let throughput_rps = if duration_s > 0.0 { n / duration_s } else { 0.0 };

    Some(WindowSummary {
        window_start: window.window_start,
        window_end: window.window_end,
        duration_s,
        count,
        throughput_rps,
        mean_ms: mean,
        min_ms: sorted[0],
        p50_ms: percentile(&sorted, 50.0),
        p90_ms: percentile(&sorted, 90.0),
        p95_ms: percentile(&sorted, 95.0),
        p99_ms: percentile(&sorted, 99.0),
        max_ms: sorted[count - 1],
        stdev_ms: variance.sqrt(),
    })
}

/// Percentile of an ascending, non-empty slice, linearly interpolated at
/// fractional rank `p/100 * (N-1)`.
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    debug_assert!(!sorted.is_empty());
    let last = sorted.len() - 1;
    let rank = (p / 100.0).clamp(0.0, 1.0) * last as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}
