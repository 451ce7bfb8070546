use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the unix epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Convert a unix timestamp in (possibly fractional) seconds to epoch
/// milliseconds. Feed contracts deliver seconds; everything internal runs
/// on milliseconds.
pub fn secs_to_ms(secs: f64) -> u64 {
    if secs <= 0.0 {
        return 0;
    }
    (secs * 1_000.0) as u64
}
