//! Step-wise instruction interpreter
//!
//! One call to [`step`] consumes exactly one top-level instruction. A
//! `For` executes its whole (nested) body inline within that step and
//! counts as a single instruction for accounting and quantum purposes.
//! Memory side effects flow through a borrowed [`MemoryManager`]; an
//! out-of-range access kills the process mid-step.

use simos_core::clock;
use simos_memory::{BackingStore, MemoryManager, Violation};

use crate::instruction::{Instruction, Operand};
use crate::process::{Process, ProcessState};

/// What a single step did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    /// Consumed one top-level instruction.
    Executed,
    /// The consumed instruction put the process to sleep.
    Slept,
    /// An out-of-range access killed the process at this address.
    Violation(u32),
    /// Nothing left to execute.
    Idle,
}

/// Execute the next top-level instruction of `process`.
pub fn step<S: BackingStore>(process: &mut Process, mem: &mut MemoryManager<S>) -> StepOutcome {
    if process.is_complete() {
        return StepOutcome::Idle;
    }

    let instruction = process.program[process.executed].clone();
    let timestamp = clock::wall_clock_now();
    let core = process.core.map(|c| c as i64).unwrap_or(-1);
    let mut slept = false;

    match exec(process, mem, &instruction, &mut slept) {
        Ok(result) => {
            process.executed += 1;
            let mut entry = format!("({}) Core:{} {}", timestamp, core, instruction);
            if !result.is_empty() {
                entry.push_str(" -> ");
                entry.push_str(&result);
            }
            process.log.push(entry);

            if slept {
                StepOutcome::Slept
            } else {
                StepOutcome::Executed
            }
        }
        Err(address) => {
            let violation = mem.violation(process.pid).cloned().unwrap_or(Violation {
                address,
                timestamp: clock::wall_clock_time(),
            });
            process.log.push(format!(
                "({}) Core:{} {} -> Memory access violation at 0x{:x}",
                timestamp, core, instruction, address
            ));
            process.mark_violated(violation);
            log::debug!("{} killed by violation at 0x{:x}", process.pid, address);
            StepOutcome::Violation(address)
        }
    }
}

/// Execute one instruction (recursively for `For` bodies).
///
/// `Ok` carries the log suffix; `Err` carries a violating address.
fn exec<S: BackingStore>(
    process: &mut Process,
    mem: &mut MemoryManager<S>,
    instruction: &Instruction,
    slept: &mut bool,
) -> Result<String, u32> {
    let pid = process.pid;
    match instruction {
        Instruction::Declare { var, value } => {
            if mem.declare_variable(pid, var, *value) {
                Ok(format!("Declared {} = {}", var, value))
            } else {
                Ok("symbol table full; DECLARE ignored".to_string())
            }
        }
        Instruction::Add { dst, lhs, rhs } => {
            let a = operand_value(mem, process, lhs);
            let b = operand_value(mem, process, rhs);
            let sum = ((a as u32 + b as u32).min(u16::MAX as u32)) as u16;
            store_result(mem, process, dst, sum);
            Ok(format!("{} = {} + {} = {}", dst, a, b, sum))
        }
        Instruction::Sub { dst, lhs, rhs } => {
            let a = operand_value(mem, process, lhs);
            let b = operand_value(mem, process, rhs);
            let difference = a.saturating_sub(b);
            store_result(mem, process, dst, difference);
            Ok(format!("{} = {} - {} = {}", dst, a, b, difference))
        }
        Instruction::Print { message, var } => match var {
            Some(name) => {
                let value = mem.get_or_declare(pid, name);
                Ok(format!("OUTPUT: {}{}", message, value))
            }
            None => Ok(format!("OUTPUT: {}", message)),
        },
        Instruction::Sleep { ticks } => {
            if *ticks > 0 {
                process.sleep_remaining = *ticks as u32;
                process.state = ProcessState::Waiting;
                *slept = true;
            }
            Ok(format!("Sleeping for {} CPU ticks", ticks))
        }
        Instruction::For { body, repeats } => {
            for _ in 0..*repeats {
                for inner in body {
                    exec(process, mem, inner, slept)?;
                }
            }
            Ok(format!("Executed FOR loop {} times", repeats))
        }
        Instruction::Read { address } => {
            let value = mem.read(pid, *address);
            if mem.violation(pid).is_some() {
                return Err(*address);
            }
            Ok(format!("READ 0x{:X} = {}", address, value))
        }
        Instruction::Write { address, value } => {
            let resolved = operand_value(mem, process, value);
            let ok = mem.write(pid, *address, resolved);
            if mem.violation(pid).is_some() {
                return Err(*address);
            }
            if ok {
                Ok(format!("WRITE {} to 0x{:X}", resolved, address))
            } else {
                Ok(format!("WRITE to 0x{:X} failed", address))
            }
        }
    }
}

fn operand_value<S: BackingStore>(
    mem: &mut MemoryManager<S>,
    process: &Process,
    operand: &Operand,
) -> u16 {
    match operand {
        Operand::Value(v) => *v,
        Operand::Var(name) => mem.get_or_declare(process.pid, name),
    }
}

/// Arithmetic destinations declare-or-update; a full symbol table makes
/// the store a logged no-op.
fn store_result<S: BackingStore>(
    mem: &mut MemoryManager<S>,
    process: &Process,
    dst: &str,
    value: u16,
) {
    if !mem.declare_variable(process.pid, dst, value) {
        log::debug!("{}: symbol table full, dropping store to {}", process.pid, dst);
    }
}
