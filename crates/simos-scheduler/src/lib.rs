//! SimOS scheduler
//!
//! The multi-core scheduling layer of the emulator, split the same way as
//! the memory manager: a pure state machine ([`SchedulerState`]) that owns
//! the process arena, ready queue, core slots, and terminated list and can
//! be driven tick by tick in tests, wrapped by a threaded runtime
//! ([`Scheduler`]) that adds one worker thread per core, a generator
//! thread, locks, and the condition-variable ready wait.

pub mod error;
pub mod report;
pub mod scheduler;
pub mod snapshot;
pub mod state;

pub use error::SchedulerError;
pub use scheduler::Scheduler;
pub use snapshot::{MemoryStatus, ProcessSnapshot, SystemStatus};
pub use state::{CoreTick, SchedulerState};
