//! Per-process state
//!
//! A `Process` owns its program, execution position, sleep counter, log,
//! and metrics. Records live in the scheduler's arena and are referenced
//! everywhere else by [`Pid`].

use core::fmt;

use simos_core::{clock, Pid};
use simos_memory::Violation;

use crate::instruction::Instruction;

/// Process lifecycle states.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcessState {
    /// Created, not yet admitted to the ready queue.
    New,
    /// On the ready queue.
    Ready,
    /// Assigned to a core slot.
    Running,
    /// Sleeping; `sleep_remaining` ticks left.
    Waiting,
    /// Finished or killed.
    Terminated,
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProcessState::New => "NEW",
            ProcessState::Ready => "READY",
            ProcessState::Running => "RUNNING",
            ProcessState::Waiting => "WAITING",
            ProcessState::Terminated => "TERMINATED",
        };
        write!(f, "{}", name)
    }
}

/// Timing metrics, in epoch milliseconds. Burst is the program length.
#[derive(Clone, Debug, Default)]
pub struct ProcessMetrics {
    pub arrival_ms: i64,
    pub response_ms: Option<i64>,
    pub turnaround_ms: Option<i64>,
    pub waiting_ms: Option<i64>,
    pub burst: usize,
}

/// One emulated process.
#[derive(Clone, Debug)]
pub struct Process {
    pub pid: Pid,
    pub name: String,
    pub state: ProcessState,
    /// Core slot while RUNNING/WAITING on a core; `None` otherwise.
    pub core: Option<usize>,
    /// Strictly monotonic admission order; FCFS and all tie-breaks use it.
    pub arrival_seq: u64,
    pub created_at: String,
    pub completed_at: Option<String>,
    /// The program, fixed at admission.
    pub program: Vec<Instruction>,
    /// Top-level instructions consumed.
    pub executed: usize,
    /// Ticks of sleep left before the process is runnable again.
    pub sleep_remaining: u32,
    /// Allocated virtual bytes.
    pub allocated_memory: usize,
    /// Append-only execution log.
    pub log: Vec<String>,
    pub metrics: ProcessMetrics,
    /// Copied out of the memory manager when the process is killed for an
    /// out-of-range access.
    pub violation: Option<Violation>,
}

impl Process {
    pub fn new(
        pid: Pid,
        name: String,
        arrival_seq: u64,
        allocated_memory: usize,
        program: Vec<Instruction>,
    ) -> Self {
        let burst = program.len();
        Self {
            pid,
            name,
            state: ProcessState::New,
            core: None,
            arrival_seq,
            created_at: clock::wall_clock_now(),
            completed_at: None,
            program,
            executed: 0,
            sleep_remaining: 0,
            allocated_memory,
            log: Vec::new(),
            metrics: ProcessMetrics {
                arrival_ms: clock::epoch_millis(),
                burst,
                ..ProcessMetrics::default()
            },
            violation: None,
        }
    }

    /// Total top-level instructions in the program.
    pub fn total_instructions(&self) -> usize {
        self.program.len()
    }

    /// All instructions consumed, or killed.
    pub fn is_complete(&self) -> bool {
        self.executed >= self.program.len() || self.state == ProcessState::Terminated
    }

    /// Record first-dispatch response time.
    pub fn mark_dispatched(&mut self) {
        if self.metrics.response_ms.is_none() {
            self.metrics.response_ms = Some(clock::epoch_millis() - self.metrics.arrival_ms);
        }
    }

    /// Finalize state and metrics on normal completion.
    ///
    /// Idempotent; pins `executed` to the program length.
    pub fn mark_completed(&mut self) {
        self.executed = self.program.len();
        self.state = ProcessState::Terminated;
        self.core = None;
        if self.completed_at.is_none() {
            self.completed_at = Some(clock::wall_clock_now());
            let turnaround = clock::epoch_millis() - self.metrics.arrival_ms;
            self.metrics.turnaround_ms = Some(turnaround);
            self.metrics.waiting_ms = Some(turnaround - self.metrics.burst as i64);
        }
    }

    /// Kill the process for an out-of-range access. `executed` is left
    /// where it stopped.
    pub fn mark_violated(&mut self, violation: Violation) {
        if self.violation.is_none() {
            self.violation = Some(violation);
        }
        self.state = ProcessState::Terminated;
        self.core = None;
        if self.completed_at.is_none() {
            self.completed_at = Some(clock::wall_clock_now());
        }
    }

    /// The shell-visible explanation for a violation kill.
    pub fn violation_message(&self) -> Option<String> {
        let violation = self.violation.as_ref()?;
        Some(format!(
            "Process {} shut down due to memory access violation error that occurred at {}. 0x{:x} invalid.",
            self.name, violation.timestamp, violation.address
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn process(program: Vec<Instruction>) -> Process {
        Process::new(Pid(1), "proc01".into(), 1, 64, program)
    }

    #[test]
    fn test_new_process_is_fresh() {
        let p = process(vec![
            Instruction::Sleep { ticks: 1 },
            Instruction::Sleep { ticks: 2 },
        ]);
        assert_eq!(p.state, ProcessState::New);
        assert_eq!(p.executed, 0);
        assert_eq!(p.total_instructions(), 2);
        assert_eq!(p.metrics.burst, 2);
        assert!(!p.is_complete());
        assert!(p.core.is_none());
    }

    #[test]
    fn test_mark_completed_is_idempotent_and_pins_executed() {
        let mut p = process(vec![Instruction::Sleep { ticks: 1 }; 5]);
        p.executed = 3;
        p.mark_completed();

        assert_eq!(p.executed, 5);
        assert_eq!(p.state, ProcessState::Terminated);
        assert!(p.is_complete());
        let first_stamp = p.completed_at.clone();

        p.mark_completed();
        assert_eq!(p.completed_at, first_stamp);
    }

    #[test]
    fn test_mark_dispatched_records_response_once() {
        let mut p = process(vec![Instruction::Sleep { ticks: 1 }]);
        assert!(p.metrics.response_ms.is_none());
        p.mark_dispatched();
        let first = p.metrics.response_ms;
        assert!(first.is_some());
        p.mark_dispatched();
        assert_eq!(p.metrics.response_ms, first);
    }

    #[test]
    fn test_violation_message_format() {
        let mut p = process(vec![Instruction::Read { address: 0x80 }]);
        p.mark_violated(Violation {
            address: 0x80,
            timestamp: "13:37:00".into(),
        });

        assert_eq!(p.state, ProcessState::Terminated);
        assert_eq!(
            p.violation_message().unwrap(),
            "Process proc01 shut down due to memory access violation error \
             that occurred at 13:37:00. 0x80 invalid."
        );
    }

    #[test]
    fn test_violation_does_not_pin_executed() {
        let mut p = process(vec![Instruction::Read { address: 0 }; 4]);
        p.executed = 2;
        p.mark_violated(Violation {
            address: 0x100,
            timestamp: "00:00:00".into(),
        });
        assert_eq!(p.executed, 2);
        assert!(p.is_complete());
    }
}
