//! Scheduler error taxonomy

use core::fmt;

use simos_memory::MemoryError;

/// Errors surfaced through the scheduler's public contract.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SchedulerError {
    /// Bad caller input: a memory size that is not an admissible power of
    /// two, or an instruction list outside [1, 50]. No side effects
    /// occurred.
    InvalidArgument(String),
    /// Admission refused by the memory manager; the caller may retry
    /// later (the generator backs off).
    ResourceExhausted(MemoryError),
    /// The process table is contended; retry the query.
    Busy,
    /// A report or log file could not be written.
    Io(String),
}

impl fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedulerError::InvalidArgument(msg) => write!(f, "invalid argument: {}", msg),
            SchedulerError::ResourceExhausted(e) => write!(f, "resources exhausted: {}", e),
            SchedulerError::Busy => write!(f, "system busy, please try again"),
            SchedulerError::Io(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for SchedulerError {}

impl From<MemoryError> for SchedulerError {
    fn from(e: MemoryError) -> Self {
        match e {
            MemoryError::InvalidSize(size) => {
                SchedulerError::InvalidArgument(format!("invalid memory size {}", size))
            }
            other => SchedulerError::ResourceExhausted(other),
        }
    }
}
