//! Query-API snapshot types
//!
//! The shell and report writers never see references into the process
//! arena; every query copies what it needs into these structs.

use simos_core::Pid;
use simos_process::{Process, ProcessState};

/// Point-in-time copy of one process's observable state.
#[derive(Clone, Debug)]
pub struct ProcessSnapshot {
    pub pid: Pid,
    pub name: String,
    pub state: ProcessState,
    pub core: Option<usize>,
    pub arrival_seq: u64,
    pub executed: usize,
    pub total: usize,
    pub created_at: String,
    pub completed_at: Option<String>,
    pub allocated_memory: usize,
    /// Execution log lines, for `screen -r` / `process-smi`.
    pub log: Vec<String>,
    /// Present when the process was killed for an out-of-range access.
    pub violation_message: Option<String>,
}

impl ProcessSnapshot {
    pub fn of(process: &Process) -> Self {
        Self {
            pid: process.pid,
            name: process.name.clone(),
            state: process.state,
            core: process.core,
            arrival_seq: process.arrival_seq,
            executed: process.executed,
            total: process.total_instructions(),
            created_at: process.created_at.clone(),
            completed_at: process.completed_at.clone(),
            allocated_memory: process.allocated_memory,
            log: process.log.clone(),
            violation_message: process.violation_message(),
        }
    }
}

/// CPU occupancy summary.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SystemStatus {
    pub total_cores: usize,
    pub cores_used: usize,
    pub cores_available: usize,
    /// Integer percent.
    pub cpu_utilization: u32,
}

/// Physical-memory summary for the monitor views.
#[derive(Clone, Debug)]
pub struct MemoryStatus {
    pub total_bytes: usize,
    pub used_bytes: usize,
    pub free_bytes: usize,
    /// `(process name, allocated bytes)` for each live allocation.
    pub allocations: Vec<(String, usize)>,
}
