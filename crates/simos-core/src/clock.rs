//! Wall-clock timestamp formatting
//!
//! Two formats appear in the emulator's observable output: the long form
//! used for process creation/completion stamps and report headers, and the
//! short time-of-day form used in memory-violation messages.

use chrono::Local;

/// Full local timestamp: `08/01/2026, 09:15:42 AM`.
pub fn wall_clock_now() -> String {
    Local::now().format("%m/%d/%Y, %I:%M:%S %p").to_string()
}

/// Time-of-day only: `09:15:42`.
pub fn wall_clock_time() -> String {
    Local::now().format("%H:%M:%S").to_string()
}

/// Milliseconds since the Unix epoch, for arrival/turnaround arithmetic.
pub fn epoch_millis() -> i64 {
    Local::now().timestamp_millis()
}
