//! SimOS shared leaf types
//!
//! Types used by every other crate in the workspace:
//! - `Pid` - stable process identifier
//! - wall-clock timestamp helpers for logs and reports

use core::fmt;
use serde::{Deserialize, Serialize};

pub mod clock;

pub use clock::{wall_clock_now, wall_clock_time};

/// Process identifier.
///
/// Pids are assigned monotonically by the scheduler and never reused. Every
/// queue, core slot, and list in the system holds `Pid`s; the scheduler's
/// process arena owns the actual records.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Pid(pub u64);

impl fmt::Display for Pid {
    /// Renders as the zero-padded form used in logs and the shell
    /// (`p001`, `p002`, ...).
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{:03}", self.0)
    }
}
