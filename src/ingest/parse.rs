use crate::config::{MAX_LATENCY_MS, MIN_LATENCY_MS};

/// Decode one datagram payload into a latency sample in milliseconds.
///
/// The payload is UTF-8 text of a single decimal number, surrounding
/// whitespace allowed. Anything that is not valid UTF-8, does not parse, or
/// falls outside `(0, 60000)` ms yields None. NaN and infinities fail the
/// range check.
pub fn parse_sample(payload: &[u8]) -> Option<f64> {
    let text = std::str::from_utf8(payload).ok()?;
    let value: f64 = text.trim().parse().ok()?;
    is_plausible(value).then_some(value)
}

#[inline]
pub fn is_plausible(value_ms: f64) -> bool {
    value_ms > MIN_LATENCY_MS && value_ms < MAX_LATENCY_MS
}
