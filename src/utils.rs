//! Utility functions for logging and timing.

use chrono::{DateTime, Utc};
use std::time::Instant;
use tracing::info;

/// Convert milliseconds to a human-readable UTC string (e.g., "2025-03-21 14:32:17 UTC").
pub fn format_time(ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| format!("Invalid({})", ms))
}

/// Measure the execution time of a closure and log it with a label.
/// Returns the value returned by the closure.
pub fn measure_time<T, F: FnOnce() -> T>(label: &str, f: F) -> T {
    let start = Instant::now();
    let result = f();
    let elapsed = start.elapsed();
    info!("{} took: {:.2} ms", label, elapsed.as_secs_f64() * 1000.0);
    result
}
