//! Pure scheduling state machine
//!
//! `SchedulerState` owns the process arena and all queues; one call to
//! [`SchedulerState::tick_core`] performs one core's scheduling step:
//! dispatch, sleep consumption, instruction execution, completion, and
//! quantum accounting. No threads, no locks, no I/O beyond what the
//! borrowed memory manager does. The threaded runtime and the test suites
//! drive the same code.

use std::collections::{BTreeMap, VecDeque};

use simos_config::{Config, SchedPolicy};
use simos_core::Pid;
use simos_memory::{BackingStore, MemoryManager};
use simos_process::{step, Instruction, Process, ProcessState, StepOutcome};

use crate::error::SchedulerError;
use crate::snapshot::{ProcessSnapshot, SystemStatus};

/// What one scheduling tick on one core did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CoreTick {
    /// No runnable process; an idle tick was accounted.
    Idle,
    /// Consumed one sleep tick; `woke` when the sleeper returned to the
    /// ready queue.
    Slept { woke: bool },
    /// Executed `executed` instructions; `requeued` when the process was
    /// preempted back to the ready queue tail.
    Worked { executed: usize, requeued: bool },
}

/// The scheduler's entire mutable state.
pub struct SchedulerState {
    config: Config,
    /// Process arena; owns every record. Queues and slots hold `Pid`s.
    table: BTreeMap<Pid, Process>,
    /// Ready queue. Admission order equals arrival order; wakes and
    /// preemptions append at the tail.
    ready: VecDeque<Pid>,
    /// One slot per core.
    running: Vec<Option<Pid>>,
    /// Per-core RR quantum counters, in instructions.
    quantum: Vec<u32>,
    /// Completed and killed processes, sorted by arrival sequence.
    terminated: Vec<Pid>,
    next_pid: u64,
    next_arrival: u64,
}

impl SchedulerState {
    pub fn new(config: Config) -> Self {
        let cores = config.num_cpu;
        Self {
            config,
            table: BTreeMap::new(),
            ready: VecDeque::new(),
            running: vec![None; cores],
            quantum: vec![0; cores],
            terminated: Vec::new(),
            next_pid: 1,
            next_arrival: 1,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    // ========================================================================
    // Admission
    // ========================================================================

    /// Admit a process: allocate its memory, assign the next pid and
    /// arrival sequence, and enqueue it READY.
    ///
    /// Allocation failure admits nothing and assigns no sequence numbers.
    pub fn admit<S: BackingStore>(
        &mut self,
        mem: &mut MemoryManager<S>,
        name: String,
        memory_size: usize,
        program: Vec<Instruction>,
    ) -> Result<Pid, SchedulerError> {
        if program.is_empty() {
            return Err(SchedulerError::InvalidArgument(
                "instruction list is empty".into(),
            ));
        }

        let pid = Pid(self.next_pid);
        mem.allocate(pid, memory_size)?;
        self.next_pid += 1;

        let arrival_seq = self.next_arrival;
        self.next_arrival += 1;

        let mut process = Process::new(pid, name, arrival_seq, memory_size, program);
        process.state = ProcessState::Ready;
        log::info!(
            "admitted {} ({}) with {} instructions, {} bytes",
            process.name,
            pid,
            process.total_instructions(),
            memory_size
        );
        self.table.insert(pid, process);
        self.ready.push_back(pid);
        Ok(pid)
    }

    // ========================================================================
    // Dispatch
    // ========================================================================

    /// Pick the next process for an empty slot, per policy.
    fn pick_next(&mut self) -> Option<Pid> {
        match self.config.scheduler {
            SchedPolicy::Fcfs => {
                // Smallest arrival sequence, stable on the first minimum.
                let idx = self
                    .ready
                    .iter()
                    .enumerate()
                    .min_by_key(|(_, &pid)| self.table[&pid].arrival_seq)
                    .map(|(i, _)| i)?;
                self.ready.remove(idx)
            }
            SchedPolicy::RoundRobin => self.ready.pop_front(),
        }
    }

    /// One scheduling tick on `core`, executing up to `chunk` instructions
    /// (the fast-path batch; 1 outside fast mode).
    pub fn tick_core<S: BackingStore>(
        &mut self,
        mem: &mut MemoryManager<S>,
        core: usize,
        chunk: usize,
    ) -> CoreTick {
        // Dispatch into an empty slot.
        if self.running[core].is_none() {
            if let Some(pid) = self.pick_next() {
                let process = self.table.get_mut(&pid).expect("ready pid is in arena");
                process.state = ProcessState::Running;
                process.core = Some(core);
                process.mark_dispatched();
                self.running[core] = Some(pid);
            }
        }

        let Some(pid) = self.running[core] else {
            mem.record_idle_tick();
            return CoreTick::Idle;
        };

        // A sleeping process consumes the tick without advancing.
        {
            let process = self.table.get_mut(&pid).expect("slot pid is in arena");
            if process.sleep_remaining > 0 {
                process.sleep_remaining -= 1;
                if process.sleep_remaining == 0 {
                    process.state = ProcessState::Ready;
                    process.core = None;
                    self.ready.push_back(pid);
                    self.running[core] = None;
                    self.quantum[core] = 0;
                    return CoreTick::Slept { woke: true };
                }
                return CoreTick::Slept { woke: false };
            }
        }

        // Execute instructions. Under RR a fast-path chunk never crosses
        // the quantum boundary.
        let chunk = if self.config.scheduler == SchedPolicy::RoundRobin {
            let remaining = self
                .config
                .quantum_cycles
                .saturating_sub(self.quantum[core])
                .max(1) as usize;
            chunk.min(remaining)
        } else {
            chunk
        };
        let mut executed = 0;
        loop {
            let outcome = {
                let process = self.table.get_mut(&pid).expect("slot pid is in arena");
                step(process, mem)
            };
            match outcome {
                StepOutcome::Executed => {
                    executed += 1;
                    mem.record_active_tick();
                    if self.table[&pid].is_complete() {
                        self.finish(mem, pid, core);
                        break;
                    }
                    if executed >= chunk {
                        break;
                    }
                }
                StepOutcome::Slept => {
                    executed += 1;
                    mem.record_active_tick();
                    break;
                }
                StepOutcome::Violation(_) => {
                    executed += 1;
                    mem.record_active_tick();
                    self.bury_violated(mem, pid, core);
                    break;
                }
                StepOutcome::Idle => {
                    self.finish(mem, pid, core);
                    break;
                }
            }
        }

        // Quantum accounting for a process still running under RR.
        let mut requeued = false;
        if self.config.scheduler == SchedPolicy::RoundRobin {
            if let Some(pid) = self.running[core] {
                if self.table[&pid].state == ProcessState::Running {
                    self.quantum[core] += executed as u32;
                    if self.quantum[core] >= self.config.quantum_cycles {
                        self.quantum[core] = 0;
                        let process = self.table.get_mut(&pid).expect("slot pid is in arena");
                        process.state = ProcessState::Ready;
                        process.core = None;
                        self.ready.push_back(pid);
                        self.running[core] = None;
                        requeued = true;
                    }
                }
            }
        }

        CoreTick::Worked { executed, requeued }
    }

    /// Normal completion: finalize metrics, free frames, move to the
    /// terminated list sorted by arrival sequence, clear the slot.
    fn finish<S: BackingStore>(&mut self, mem: &mut MemoryManager<S>, pid: Pid, core: usize) {
        let process = self.table.get_mut(&pid).expect("finishing pid is in arena");
        process.mark_completed();
        log::info!("{} ({}) completed", process.name, pid);

        mem.deallocate(pid);
        self.insert_terminated(pid);
        self.running[core] = None;
        self.quantum[core] = 0;
    }

    /// Violation kill: the interpreter already marked the process; free
    /// its frames and retire it.
    fn bury_violated<S: BackingStore>(&mut self, mem: &mut MemoryManager<S>, pid: Pid, core: usize) {
        if let Some(message) = self.table[&pid].violation_message() {
            log::warn!("{}", message);
        }
        mem.deallocate(pid);
        self.insert_terminated(pid);
        self.running[core] = None;
        self.quantum[core] = 0;
    }

    fn insert_terminated(&mut self, pid: Pid) {
        let arrival = self.table[&pid].arrival_seq;
        let pos = self
            .terminated
            .partition_point(|&q| self.table[&q].arrival_seq <= arrival);
        self.terminated.insert(pos, pid);
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn admitted_count(&self) -> usize {
        self.table.len()
    }

    pub fn ready_count(&self) -> usize {
        self.ready.len()
    }

    pub fn terminated_count(&self) -> usize {
        self.terminated.len()
    }

    pub fn busy_cores(&self) -> usize {
        self.running.iter().flatten().count()
    }

    pub fn system_status(&self) -> SystemStatus {
        let total_cores = self.config.num_cpu;
        let cores_used = self.busy_cores();
        SystemStatus {
            total_cores,
            cores_used,
            cores_available: total_cores - cores_used,
            cpu_utilization: (cores_used * 100 / total_cores) as u32,
        }
    }

    /// Processes currently holding core slots, in core order.
    pub fn running_snapshots(&self) -> Vec<ProcessSnapshot> {
        self.running
            .iter()
            .flatten()
            .map(|pid| ProcessSnapshot::of(&self.table[pid]))
            .collect()
    }

    /// Terminated processes in arrival order.
    pub fn terminated_snapshots(&self) -> Vec<ProcessSnapshot> {
        self.terminated
            .iter()
            .map(|pid| ProcessSnapshot::of(&self.table[pid]))
            .collect()
    }

    /// Look a process up by display name or pid string (`p001`).
    pub fn find(&self, name_or_pid: &str) -> Option<ProcessSnapshot> {
        self.table
            .values()
            .find(|p| p.name == name_or_pid || p.pid.to_string() == name_or_pid)
            .map(ProcessSnapshot::of)
    }

    /// Map a live pid to its display name (for the memory views).
    pub fn name_of(&self, pid: Pid) -> Option<&str> {
        self.table.get(&pid).map(|p| p.name.as_str())
    }

    /// How many processes the generator should create this period to keep
    /// the cores fed plus a little queue slack.
    pub fn generation_target(&self, test_mode: bool) -> usize {
        let active = self.busy_cores();
        let queued = self.ready_count();
        let workload = active + queued;
        let cores = self.config.num_cpu;

        if test_mode {
            return (cores * 2).saturating_sub(workload).max(1);
        }

        let available = cores - active;
        let mut target = 0;
        if available > 0 {
            target = available;
            if queued < 3 {
                target += 3 - queued;
            }
        } else if queued < 2 {
            target = 2 - queued;
        }

        // Fast execution drains the queue quickly; feed it harder.
        if self.config.delay_per_exec <= 5 {
            let desired = cores + 5;
            if workload < desired {
                target = target.max(desired - workload);
            }
            if self.config.delay_per_exec == 0 && workload < cores * 2 {
                target = target.max(2);
            }
        }
        target
    }

    /// Cross-checks of the scheduling invariants; returns violations.
    ///
    /// Cheap enough to call after every tick in tests.
    pub fn check_invariants(&self) -> Vec<String> {
        let mut violations = Vec::new();

        // Ready, running, and terminated hold disjoint pids covering no
        // more than the arena.
        let mut seen: BTreeMap<Pid, &'static str> = BTreeMap::new();
        let mut note = |pid: Pid, list: &'static str, violations: &mut Vec<String>| {
            if let Some(first) = seen.insert(pid, list) {
                violations.push(format!("{} held by both {} and {}", pid, first, list));
            }
        };
        for &pid in &self.ready {
            note(pid, "ready", &mut violations);
        }
        for pid in self.running.iter().flatten() {
            note(*pid, "running", &mut violations);
        }
        for &pid in &self.terminated {
            note(pid, "terminated", &mut violations);
        }
        for pid in seen.keys() {
            if !self.table.contains_key(pid) {
                violations.push(format!("{} queued but not in arena", pid));
            }
        }

        for (core, slot) in self.running.iter().enumerate() {
            if let Some(pid) = slot {
                match self.table.get(pid) {
                    Some(p) if p.core != Some(core) => violations.push(format!(
                        "{} on core {} but records core {:?}",
                        pid, core, p.core
                    )),
                    None => violations.push(format!("core {} slot holds unknown {}", core, pid)),
                    _ => {}
                }
            }
        }

        for process in self.table.values() {
            if process.executed > process.total_instructions() {
                violations.push(format!(
                    "{} executed {} of {}",
                    process.pid,
                    process.executed,
                    process.total_instructions()
                ));
            }
            if process.sleep_remaining > 0 && process.state != ProcessState::Waiting {
                violations.push(format!(
                    "{} sleeping but in state {}",
                    process.pid, process.state
                ));
            }
        }

        for &pid in &self.terminated {
            if let Some(p) = self.table.get(&pid) {
                if p.state != ProcessState::Terminated {
                    violations.push(format!("{} retired but in state {}", pid, p.state));
                }
            }
        }

        violations
    }

    /// Fatal-error path: log every violated invariant and abort.
    ///
    /// A breach means the arena, queues, or slots are corrupted; another
    /// tick would schedule from that corrupted state, so the runtime
    /// calls this after every tick and every admission.
    pub fn assert_invariants(&self) {
        let violations = self.check_invariants();
        if violations.is_empty() {
            return;
        }
        for violation in &violations {
            log::error!("scheduler invariant violated: {}", violation);
        }
        std::process::abort();
    }
}
