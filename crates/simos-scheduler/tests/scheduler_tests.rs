//! End-to-end scheduler scenarios
//!
//! These drive the pure `SchedulerState` tick by tick, so every scenario
//! is fully deterministic; the threaded runtime is exercised separately
//! for lifecycle and generator behavior.

use simos_config::{Config, SchedPolicy};
use simos_core::Pid;
use simos_memory::{FileBackingStore, MemBackingStore, MemoryManager, MemoryParams};
use simos_process::{Instruction, Operand, ProcessState};
use simos_scheduler::{CoreTick, SchedulerState};

fn config(policy: SchedPolicy, cores: usize, quantum: u32) -> Config {
    Config {
        num_cpu: cores,
        scheduler: policy,
        quantum_cycles: quantum,
        min_mem_per_proc: 64,
        max_mem_per_proc: 1024,
        max_overall_mem: 4096,
        mem_per_frame: 16,
        ..Config::default()
    }
}

fn memory_for(config: &Config) -> MemoryManager<MemBackingStore> {
    MemoryManager::new(
        MemoryParams {
            max_overall_mem: config.max_overall_mem,
            mem_per_frame: config.mem_per_frame,
            min_mem_per_proc: config.min_mem_per_proc,
            max_mem_per_proc: config.max_mem_per_proc,
        },
        MemBackingStore::new(),
    )
}

fn adds(n: usize) -> Vec<Instruction> {
    vec![
        Instruction::Add {
            dst: "x".into(),
            lhs: Operand::Var("x".into()),
            rhs: Operand::Value(1),
        };
        n
    ]
}

// ============================================================================
// Scenario 1: single-core FCFS ordering
// ============================================================================

#[test]
fn fcfs_single_core_terminates_in_arrival_order() {
    let config = config(SchedPolicy::Fcfs, 1, 5);
    let mut mem = memory_for(&config);
    let mut state = SchedulerState::new(config);

    state.admit(&mut mem, "a".into(), 64, adds(10)).unwrap();
    state.admit(&mut mem, "b".into(), 64, adds(10)).unwrap();

    let mut a_done_before_b_started = true;
    while state.terminated_count() < 2 {
        state.tick_core(&mut mem, 0, 1);
        assert_eq!(state.check_invariants(), Vec::<String>::new());

        // b must not run a single instruction until a has terminated
        let b = state.find("b").unwrap();
        if b.executed > 0 && state.find("a").unwrap().state != ProcessState::Terminated {
            a_done_before_b_started = false;
        }
    }
    assert!(a_done_before_b_started);

    let done = state.terminated_snapshots();
    assert_eq!(done.len(), 2);
    assert_eq!(done[0].name, "a");
    assert_eq!(done[1].name, "b");
    assert!(done[0].completed_at.is_some());
}

// ============================================================================
// Scenario 2: RR quantum interleaving
// ============================================================================

#[test]
fn rr_quantum_three_alternates_in_triples() {
    let config = config(SchedPolicy::RoundRobin, 1, 3);
    let mut mem = memory_for(&config);
    let mut state = SchedulerState::new(config);

    let a = state.admit(&mut mem, "a".into(), 64, adds(9)).unwrap();
    let b = state.admit(&mut mem, "b".into(), 64, adds(9)).unwrap();

    // Reconstruct the per-tick instruction owner from executed-count deltas.
    let executed = |state: &SchedulerState, pid: Pid| {
        state
            .find(&pid.to_string())
            .map(|p| p.executed)
            .unwrap_or(0)
    };

    let mut owners = String::new();
    for _ in 0..18 {
        let before = (executed(&state, a), executed(&state, b));
        state.tick_core(&mut mem, 0, 1);
        let after = (executed(&state, a), executed(&state, b));
        if after.0 > before.0 {
            owners.push('A');
        } else if after.1 > before.1 {
            owners.push('B');
        }
    }

    assert_eq!(owners, "AAABBBAAABBBAAABBB");
    assert_eq!(state.terminated_count(), 2);
}

#[test]
fn rr_never_exceeds_quantum_consecutively() {
    let config = config(SchedPolicy::RoundRobin, 1, 4);
    let mut mem = memory_for(&config);
    let mut state = SchedulerState::new(config);

    state.admit(&mut mem, "a".into(), 64, adds(13)).unwrap();
    state.admit(&mut mem, "b".into(), 64, adds(13)).unwrap();

    let mut streak = 0usize;
    let mut last: Option<String> = None;
    while state.terminated_count() < 2 {
        let owner_before = state.running_snapshots().first().map(|p| p.name.clone());
        state.tick_core(&mut mem, 0, 1);
        let owner = owner_before.or_else(|| state.running_snapshots().first().map(|p| p.name.clone()));
        if owner == last && owner.is_some() {
            streak += 1;
        } else {
            streak = 1;
            last = owner;
        }
        assert!(streak <= 4, "a process ran {} consecutive instructions", streak);
    }
}

// ============================================================================
// Scenario 3: sleep yields the core
// ============================================================================

#[test]
fn sleep_consumes_ticks_without_advancing_program() {
    let config = config(SchedPolicy::Fcfs, 1, 5);
    let mut mem = memory_for(&config);
    let mut state = SchedulerState::new(config);

    let program = vec![
        Instruction::Declare {
            var: "x".into(),
            value: 0,
        },
        Instruction::Sleep { ticks: 2 },
        Instruction::Add {
            dst: "x".into(),
            lhs: Operand::Var("x".into()),
            rhs: Operand::Value(1),
        },
    ];
    let pid = state.admit(&mut mem, "sleeper".into(), 64, program).unwrap();

    let mut advances = Vec::new();
    for tick in 1..=6 {
        let before = state.find("sleeper").unwrap().executed;
        let result = state.tick_core(&mut mem, 0, 1);
        let after = state.find("sleeper").unwrap();
        if after.executed > before {
            advances.push(tick);
        }

        match tick {
            // Sleep ticks: WAITING, program not advancing
            3 | 4 => {
                assert!(matches!(result, CoreTick::Slept { .. }));
                assert_ne!(after.executed, 3);
            }
            _ => {}
        }
    }

    // Declare at tick 1, Sleep consumed at tick 2, two sleep ticks, then
    // re-dispatch and the final Add.
    assert_eq!(advances, vec![1, 2, 5]);
    assert_eq!(state.terminated_count(), 1);
    assert_eq!(mem.get_variable(pid, "x"), Some(1));
}

#[test]
fn sleeper_is_waiting_during_sleep_ticks() {
    let config = config(SchedPolicy::Fcfs, 1, 5);
    let mut mem = memory_for(&config);
    let mut state = SchedulerState::new(config);

    let program = vec![
        Instruction::Sleep { ticks: 3 },
        Instruction::Print {
            message: "done".into(),
            var: None,
        },
    ];
    state.admit(&mut mem, "s".into(), 64, program).unwrap();

    state.tick_core(&mut mem, 0, 1); // executes Sleep
    for _ in 0..2 {
        assert_eq!(state.find("s").unwrap().state, ProcessState::Waiting);
        state.tick_core(&mut mem, 0, 1);
    }
    // Third sleep tick wakes it
    state.tick_core(&mut mem, 0, 1);
    assert_eq!(state.find("s").unwrap().state, ProcessState::Ready);
}

// ============================================================================
// Scenario 4: memory violation terminates
// ============================================================================

#[test]
fn out_of_range_write_shuts_the_process_down() {
    let config = config(SchedPolicy::Fcfs, 1, 5);
    let mut mem = memory_for(&config);
    let mut state = SchedulerState::new(config);

    let program = vec![Instruction::Write {
        address: 0x80,
        value: Operand::Value(42),
    }];
    state.admit(&mut mem, "rogue".into(), 64, program).unwrap();

    state.tick_core(&mut mem, 0, 1);

    let done = state.terminated_snapshots();
    assert_eq!(done.len(), 1);
    assert_eq!(done[0].state, ProcessState::Terminated);

    let message = done[0].violation_message.as_ref().unwrap();
    assert!(message.starts_with(
        "Process rogue shut down due to memory access violation error that occurred at "
    ));
    assert!(message.ends_with(". 0x80 invalid."));
    // HH:MM:SS timestamp embedded in the message
    let time = &message["Process rogue shut down due to memory access violation error that occurred at ".len()..];
    assert_eq!(&time[2..3], ":");

    // Frames and bookkeeping are gone
    assert!(mem.process_memory(done[0].pid).is_none());
    assert_eq!(mem.allocations().len(), 0);
    assert_eq!(state.check_invariants(), Vec::<String>::new());
}

// ============================================================================
// Scenario 5: eviction round-trip through the file backing store
// ============================================================================

#[test]
fn eviction_roundtrip_restores_page_contents() {
    // Two frames of 16 bytes; three 16-byte processes.
    let dir = tempfile::tempdir().unwrap();
    let store = FileBackingStore::create(dir.path().join("swap.txt")).unwrap();
    let config = Config {
        num_cpu: 1,
        scheduler: SchedPolicy::RoundRobin,
        quantum_cycles: 1,
        max_overall_mem: 32,
        mem_per_frame: 16,
        min_mem_per_proc: 16,
        max_mem_per_proc: 16,
        ..Config::default()
    };
    let mut mem = MemoryManager::new(
        MemoryParams {
            max_overall_mem: 32,
            mem_per_frame: 16,
            min_mem_per_proc: 16,
            max_mem_per_proc: 16,
        },
        store,
    );
    let mut state = SchedulerState::new(config);

    let program = |value: u16| {
        vec![
            Instruction::Write {
                address: 0x0,
                value: Operand::Value(value),
            },
            Instruction::Read { address: 0x0 },
        ]
    };
    state.admit(&mut mem, "a".into(), 16, program(0xA1)).unwrap();
    state.admit(&mut mem, "b".into(), 16, program(0xB2)).unwrap();
    state.admit(&mut mem, "c".into(), 16, program(0xC3)).unwrap();

    // Quantum 1 round-robin: every process writes its page before any of
    // them reads it back, so c's write must evict and a's read must
    // reload from the backing store.
    let mut ticks = 0;
    while state.terminated_count() < 3 {
        state.tick_core(&mut mem, 0, 1);
        assert_eq!(state.check_invariants(), Vec::<String>::new());
        ticks += 1;
        assert!(ticks < 50, "workload did not drain");
    }

    let done = state.terminated_snapshots();
    let log_of = |name: &str| {
        done.iter()
            .find(|p| p.name == name)
            .unwrap()
            .log
            .join("\n")
    };
    assert!(log_of("a").contains(&format!("READ 0x0 = {}", 0xA1)));
    assert!(log_of("b").contains(&format!("READ 0x0 = {}", 0xB2)));
    assert!(log_of("c").contains(&format!("READ 0x0 = {}", 0xC3)));

    let stats = mem.stats();
    assert!(stats.pages_paged_out >= 1, "stats: {:?}", stats);
    assert!(stats.pages_paged_in >= 1, "stats: {:?}", stats);

    // The swap file carries the eviction records
    let swap = std::fs::read_to_string(dir.path().join("swap.txt")).unwrap();
    assert!(swap.contains("EVICTED: Process=p001 Page=0"));
}

// ============================================================================
// Scenario 6 support: multi-core consistency under load
// ============================================================================

#[test]
fn four_cores_drain_a_mixed_workload() {
    let config = config(SchedPolicy::RoundRobin, 4, 3);
    let mut mem = memory_for(&config);
    let mut state = SchedulerState::new(config);

    for i in 0..12 {
        let program = match i % 3 {
            0 => adds(7),
            1 => vec![
                Instruction::Sleep { ticks: 2 },
                Instruction::Write {
                    address: 0x10,
                    value: Operand::Value(i as u16),
                },
                Instruction::Read { address: 0x10 },
            ],
            _ => vec![Instruction::For {
                body: vec![Instruction::Add {
                    dst: "c".into(),
                    lhs: Operand::Var("c".into()),
                    rhs: Operand::Value(1),
                }],
                repeats: 3,
            }],
        };
        state
            .admit(&mut mem, format!("w{}", i), 64, program)
            .unwrap();
    }

    let mut rounds = 0;
    while state.terminated_count() < 12 && rounds < 200 {
        for core in 0..4 {
            state.tick_core(&mut mem, core, 1);
        }
        assert_eq!(state.check_invariants(), Vec::<String>::new());
        rounds += 1;
    }

    assert_eq!(state.terminated_count(), 12);
    assert_eq!(state.busy_cores(), 0);
    assert_eq!(state.ready_count(), 0);
    assert_eq!(mem.allocations().len(), 0);

    let stats = mem.stats();
    assert_eq!(stats.active_ticks + stats.idle_ticks, stats.total_ticks);

    // Terminated list is sorted by arrival sequence
    let done = state.terminated_snapshots();
    for pair in done.windows(2) {
        assert!(pair[0].arrival_seq < pair[1].arrival_seq);
    }
}
