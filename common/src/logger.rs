use std::time::{Duration, Instant};

use once_cell::sync::OnceCell;
use tracing_subscriber::{EnvFilter, fmt};

static LOGGER_INIT: OnceCell<()> = OnceCell::new();

/// Install the global tracing subscriber. Safe to call from every binary
/// and test entry point; only the first call wins.
pub fn init_logger(service_name: &'static str) {
    LOGGER_INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(true)
            .with_line_number(true)
            .init();

        tracing::info!(service = service_name, "logger initialized");
    });
}

/// Run `f`, emitting a `performance`-targeted warning when it overruns `max`.
/// The result is always returned; a blown budget is observable, never fatal.
pub fn warn_if_slow<T>(label: &'static str, max: Duration, f: impl FnOnce() -> T) -> T {
    let start = Instant::now();
    let out = f();
    let elapsed = start.elapsed();
    if elapsed > max {
        tracing::warn!(
            target: "performance",
            label = label,
            elapsed_ms = elapsed.as_millis() as u64,
            budget_ms = max.as_millis() as u64,
            "slow operation detected"
        );
    }
    out
}
