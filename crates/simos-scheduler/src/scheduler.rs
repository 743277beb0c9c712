//! Threaded scheduler runtime
//!
//! One OS thread per simulated core plus one generator thread, all driving
//! the pure [`SchedulerState`]. Two mutexes carry the shared state - the
//! process arena/queues and the memory manager - always taken in that
//! order; a separate creation lock serializes admission so arrival
//! sequence numbers match creation order. Idle cores wait on a condition
//! variable with a bounded timeout so idle ticks accrue and shutdown stays
//! responsive.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use simos_config::Config;
use simos_core::Pid;
use simos_memory::{BackingStore, FileBackingStore, MemoryManager, MemoryParams, VmStats};
use simos_process::{generate_program, Instruction};

use crate::error::SchedulerError;
use crate::report;
use crate::snapshot::{MemoryStatus, ProcessSnapshot, SystemStatus};
use crate::state::{CoreTick, SchedulerState};

/// Bounded idle wait on the ready queue.
const IDLE_WAIT: Duration = Duration::from_millis(50);

/// Fast-path batch size when the execution delay is very small.
const FAST_PATH_CHUNK: usize = 8;

/// Execution delays at or under this many milliseconds enable the fast
/// path.
const FAST_PATH_DELAY_MS: u64 = 5;

/// Custom instruction lists must have between 1 and this many entries.
const MAX_CUSTOM_INSTRUCTIONS: usize = 50;

struct Shared<S: BackingStore> {
    config: Config,
    state: Mutex<SchedulerState>,
    mem: Mutex<MemoryManager<S>>,
    ready_cv: Condvar,
    should_stop: AtomicBool,
    running: AtomicBool,
    generation_enabled: AtomicBool,
    /// Serializes admissions so arrival sequences match creation order.
    creation_lock: Mutex<()>,
    name_counter: AtomicU64,
}

impl<S: BackingStore> Shared<S> {
    // A worker that panicked mid-tick must not take the whole emulator
    // down with a poisoned mutex.
    fn lock_state(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_mem(&self) -> MutexGuard<'_, MemoryManager<S>> {
        self.mem.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn stopping(&self) -> bool {
        self.should_stop.load(Ordering::SeqCst)
    }

    fn chunk(&self) -> usize {
        if self.config.delay_per_exec <= FAST_PATH_DELAY_MS {
            FAST_PATH_CHUNK
        } else {
            1
        }
    }

    /// Per-instruction pacing between ticks.
    fn pace(&self) {
        if self.config.delay_per_exec > 0 {
            thread::sleep(Duration::from_millis(self.config.delay_per_exec));
        } else {
            thread::yield_now();
        }
    }

    /// Sleep `period` in small slices so shutdown stays responsive.
    fn sleep_responsive(&self, period: Duration) {
        let mut remaining = period;
        while !self.stopping() && remaining > Duration::ZERO {
            let slice = remaining.min(IDLE_WAIT);
            thread::sleep(slice);
            remaining = remaining.saturating_sub(slice);
        }
    }
}

/// The multi-core scheduler runtime.
pub struct Scheduler<S: BackingStore + Send + 'static> {
    shared: Arc<Shared<S>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Scheduler<FileBackingStore> {
    /// Build a scheduler whose memory manager swaps to a text-log backing
    /// store at `backing_path`.
    pub fn with_file_store<P: AsRef<Path>>(
        config: Config,
        backing_path: P,
    ) -> Result<Self, SchedulerError> {
        let store = FileBackingStore::create(backing_path)
            .map_err(|e| SchedulerError::Io(format!("cannot create backing store: {}", e)))?;
        Ok(Self::new(config, store))
    }
}

impl<S: BackingStore + Send + 'static> Scheduler<S> {
    pub fn new(config: Config, store: S) -> Self {
        let params = MemoryParams {
            max_overall_mem: config.max_overall_mem,
            mem_per_frame: config.mem_per_frame,
            min_mem_per_proc: config.min_mem_per_proc,
            max_mem_per_proc: config.max_mem_per_proc,
        };
        let shared = Arc::new(Shared {
            state: Mutex::new(SchedulerState::new(config.clone())),
            mem: Mutex::new(MemoryManager::new(params, store)),
            ready_cv: Condvar::new(),
            should_stop: AtomicBool::new(false),
            running: AtomicBool::new(false),
            generation_enabled: AtomicBool::new(false),
            creation_lock: Mutex::new(()),
            name_counter: AtomicU64::new(0),
            config,
        });
        Self {
            shared,
            workers: Mutex::new(Vec::new()),
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Start the core workers and the generator. Returns `false` when the
    /// scheduler is already running.
    pub fn start(&self) -> bool {
        self.start_with_generator(false)
    }

    /// Start with the denser test-mode generator (which is always active,
    /// independent of the dummy-generation toggle).
    pub fn start_test_mode(&self) -> bool {
        self.start_with_generator(true)
    }

    fn start_with_generator(&self, test_mode: bool) -> bool {
        if self.shared.running.swap(true, Ordering::SeqCst) {
            log::debug!("scheduler already running");
            return false;
        }
        self.shared.should_stop.store(false, Ordering::SeqCst);

        let mut workers = self.workers.lock().unwrap_or_else(|e| e.into_inner());
        for core in 0..self.shared.config.num_cpu {
            let shared = Arc::clone(&self.shared);
            workers.push(thread::spawn(move || core_worker(shared, core)));
        }
        let shared = Arc::clone(&self.shared);
        workers.push(thread::spawn(move || generator_worker(shared, test_mode)));

        log::info!(
            "scheduler started with {} cores ({})",
            self.shared.config.num_cpu,
            self.shared.config.scheduler
        );
        true
    }

    /// Cooperative shutdown: flag, wake everyone, join all workers.
    /// In-flight instructions complete; repeat calls are no-ops.
    pub fn stop(&self) {
        if !self.shared.running.load(Ordering::SeqCst) {
            return;
        }
        self.shared.should_stop.store(true, Ordering::SeqCst);
        self.shared.ready_cv.notify_all();

        let handles: Vec<JoinHandle<()>> = {
            let mut workers = self.workers.lock().unwrap_or_else(|e| e.into_inner());
            workers.drain(..).collect()
        };
        for handle in handles {
            let _ = handle.join();
        }
        self.shared.running.store(false, Ordering::SeqCst);
        log::info!("scheduler stopped");
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    fn ensure_started(&self) {
        if !self.is_running() {
            self.start();
        }
    }

    // ========================================================================
    // Admission
    // ========================================================================

    /// Create and admit a process.
    ///
    /// `name` defaults to `processN`. When `memory_size` is absent a
    /// random valid size is preferred, falling back through smaller sizes
    /// under memory pressure. A custom `instructions` list must have 1 to
    /// 50 entries; otherwise a program of `min-ins..=max-ins` weighted
    /// random instructions is generated.
    pub fn create_process(
        &self,
        name: Option<String>,
        memory_size: Option<usize>,
        instructions: Option<Vec<Instruction>>,
    ) -> Result<Pid, SchedulerError> {
        self.ensure_started();
        create_process(&self.shared, name, memory_size, instructions)
    }

    pub fn enable_dummy_generation(&self) {
        self.shared.generation_enabled.store(true, Ordering::SeqCst);
    }

    pub fn disable_dummy_generation(&self) {
        self.shared.generation_enabled.store(false, Ordering::SeqCst);
    }

    pub fn is_generation_enabled(&self) -> bool {
        self.shared.generation_enabled.load(Ordering::SeqCst)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn list_running(&self) -> Vec<ProcessSnapshot> {
        self.shared.lock_state().running_snapshots()
    }

    pub fn list_terminated(&self) -> Vec<ProcessSnapshot> {
        self.shared.lock_state().terminated_snapshots()
    }

    pub fn find(&self, name_or_pid: &str) -> Option<ProcessSnapshot> {
        self.shared.lock_state().find(name_or_pid)
    }

    pub fn system_status(&self) -> SystemStatus {
        self.shared.lock_state().system_status()
    }

    pub fn vm_stats(&self) -> VmStats {
        self.shared.lock_mem().stats()
    }

    /// Processes ever admitted (live plus terminated).
    pub fn admitted_count(&self) -> usize {
        self.shared.lock_state().admitted_count()
    }

    pub fn terminated_count(&self) -> usize {
        self.shared.lock_state().terminated_count()
    }

    pub fn memory_status(&self) -> MemoryStatus {
        // Lock order: process state before memory.
        let state = self.shared.lock_state();
        let mem = self.shared.lock_mem();
        let allocations = mem
            .allocations()
            .into_iter()
            .map(|(pid, bytes)| {
                let name = state
                    .name_of(pid)
                    .map(str::to_string)
                    .unwrap_or_else(|| pid.to_string());
                (name, bytes)
            })
            .collect();
        MemoryStatus {
            total_bytes: mem.total_memory(),
            used_bytes: mem.used_memory(),
            free_bytes: mem.total_memory() - mem.used_memory(),
            allocations,
        }
    }

    /// Write the utilization report. Returns [`SchedulerError::Busy`] when
    /// the process table is contended; the caller retries.
    pub fn generate_report<P: AsRef<Path>>(&self, path: P) -> Result<(), SchedulerError> {
        let text = {
            let state = match self.shared.state.try_lock() {
                Ok(state) => state,
                Err(std::sync::TryLockError::Poisoned(e)) => e.into_inner(),
                Err(std::sync::TryLockError::WouldBlock) => return Err(SchedulerError::Busy),
            };
            report::build_report(
                &state.system_status(),
                &state.running_snapshots(),
                &state.terminated_snapshots(),
            )
        };
        std::fs::write(path.as_ref(), text)
            .map_err(|e| SchedulerError::Io(format!("cannot write report: {}", e)))
    }
}

impl<S: BackingStore + Send + 'static> Drop for Scheduler<S> {
    fn drop(&mut self) {
        self.stop();
    }
}

// ============================================================================
// Worker loops
// ============================================================================

fn core_worker<S: BackingStore>(shared: Arc<Shared<S>>, core: usize) {
    let chunk = shared.chunk();
    while !shared.stopping() {
        let tick = {
            let mut state = shared.lock_state();
            let mut mem = shared.lock_mem();
            let tick = state.tick_core(&mut mem, core, chunk);
            state.assert_invariants();
            tick
        };
        match tick {
            CoreTick::Idle => {
                let guard = shared.lock_state();
                let _ = shared.ready_cv.wait_timeout(guard, IDLE_WAIT);
            }
            CoreTick::Slept { woke } => {
                if woke {
                    shared.ready_cv.notify_one();
                }
                shared.pace();
            }
            CoreTick::Worked { requeued, .. } => {
                if requeued {
                    shared.ready_cv.notify_one();
                }
                shared.pace();
            }
        }
    }
}

fn generator_worker<S: BackingStore>(shared: Arc<Shared<S>>, test_mode: bool) {
    // The period tracks the configured tick pacing; test mode is denser.
    let period = if test_mode {
        Duration::from_millis(500)
    } else {
        Duration::from_millis(
            shared.config.batch_process_freq * shared.config.delay_per_exec.max(1),
        )
    };

    while !shared.stopping() {
        if test_mode || shared.generation_enabled.load(Ordering::SeqCst) {
            let target = shared.lock_state().generation_target(test_mode);
            for _ in 0..target {
                if shared.stopping() {
                    break;
                }
                match create_process(&shared, None, None, None) {
                    Ok(_) => {}
                    Err(SchedulerError::ResourceExhausted(e)) => {
                        // Memory backpressure: stop filling this period.
                        log::debug!("generator backing off: {}", e);
                        break;
                    }
                    Err(e) => {
                        log::warn!("generator admission failed: {}", e);
                        break;
                    }
                }
            }
        }
        shared.sleep_responsive(period);
    }
}

// ============================================================================
// Admission
// ============================================================================

/// Valid per-process sizes, ascending powers of two.
fn valid_sizes(min: usize, max: usize) -> Vec<usize> {
    let mut sizes = Vec::new();
    let mut size = min.next_power_of_two().max(1);
    while size <= max {
        if size >= min {
            sizes.push(size);
        }
        size *= 2;
    }
    if sizes.is_empty() {
        sizes.push(min);
    }
    sizes
}

fn create_process<S: BackingStore>(
    shared: &Arc<Shared<S>>,
    name: Option<String>,
    memory_size: Option<usize>,
    instructions: Option<Vec<Instruction>>,
) -> Result<Pid, SchedulerError> {
    let _creation = shared.creation_lock.lock().unwrap_or_else(|e| e.into_inner());

    let name = name.unwrap_or_else(|| {
        format!(
            "process{}",
            shared.name_counter.fetch_add(1, Ordering::SeqCst)
        )
    });

    if let Some(list) = &instructions {
        if list.is_empty() || list.len() > MAX_CUSTOM_INSTRUCTIONS {
            return Err(SchedulerError::InvalidArgument(format!(
                "instruction count must be in [1, {}]",
                MAX_CUSTOM_INSTRUCTIONS
            )));
        }
    }

    let mut rng = SmallRng::from_entropy();
    let config = &shared.config;

    // Candidate sizes: the caller's exact size, or a random valid size
    // with a descending fallback under memory pressure.
    let candidates = match memory_size {
        Some(size) => vec![size],
        None => {
            let valid = valid_sizes(config.min_mem_per_proc, config.max_mem_per_proc);
            let preferred = valid[rng.gen_range(0..valid.len())];
            let mut order = vec![preferred];
            order.extend(valid.iter().rev().copied().filter(|&s| s != preferred));
            order
        }
    };

    let count = match &instructions {
        Some(list) => list.len(),
        None => {
            let hi = config.max_ins.max(config.min_ins);
            rng.gen_range(config.min_ins..=hi)
        }
    };

    let mut state = shared.lock_state();
    let mut mem = shared.lock_mem();

    let mut last_err = SchedulerError::ResourceExhausted(simos_memory::MemoryError::NoFreeFrames);
    for size in candidates {
        let program = match &instructions {
            Some(list) => list.clone(),
            None => generate_program(&mut rng, &name, count, size),
        };
        match state.admit(&mut mem, name.clone(), size, program) {
            Ok(pid) => {
                state.assert_invariants();
                drop(mem);
                drop(state);
                shared.ready_cv.notify_one();
                return Ok(pid);
            }
            Err(err @ SchedulerError::InvalidArgument(_)) => return Err(err),
            Err(err) => last_err = err,
        }
    }
    Err(last_err)
}
