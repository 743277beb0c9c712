//! Weighted synthetic-program generation
//!
//! Programs draw from the fixed instruction distribution (relative weights:
//! Declare 15, Add 20, Sub 15, Print 20, Sleep 10, For 10, Read 15,
//! Write 15). `For` nesting is capped at three levels; a would-be deeper
//! `For` degrades to an `Add`. Memory addresses are 2-aligned within the
//! process's allocation. The RNG is caller supplied so tests can seed it.

use rand::rngs::SmallRng;
use rand::Rng;

use crate::instruction::{Instruction, Operand, MAX_FOR_DEPTH};

/// Variable-name pool for generated programs.
const VAR_NAMES: &[&str] = &[
    "x", "y", "z", "counter", "sum", "temp", "result", "value",
];

/// `(kind, relative weight)` pairs for the top-level draw.
const WEIGHTS: &[(Kind, u32)] = &[
    (Kind::Declare, 15),
    (Kind::Add, 20),
    (Kind::Sub, 15),
    (Kind::Print, 20),
    (Kind::Sleep, 10),
    (Kind::For, 10),
    (Kind::Read, 15),
    (Kind::Write, 15),
];

#[derive(Clone, Copy, PartialEq, Eq)]
enum Kind {
    Declare,
    Add,
    Sub,
    Print,
    Sleep,
    For,
    Read,
    Write,
}

/// Generate a `count`-instruction program for a process named `name` with
/// `allocated_bytes` of virtual memory.
pub fn generate_program(
    rng: &mut SmallRng,
    name: &str,
    count: usize,
    allocated_bytes: usize,
) -> Vec<Instruction> {
    (0..count)
        .map(|_| generate_instruction(rng, name, allocated_bytes, 1))
        .collect()
}

fn draw_kind(rng: &mut SmallRng) -> Kind {
    let total: u32 = WEIGHTS.iter().map(|(_, w)| w).sum();
    let mut roll = rng.gen_range(0..total);
    for &(kind, weight) in WEIGHTS {
        if roll < weight {
            return kind;
        }
        roll -= weight;
    }
    Kind::Add
}

fn var(rng: &mut SmallRng) -> String {
    VAR_NAMES[rng.gen_range(0..VAR_NAMES.len())].to_string()
}

fn small_value(rng: &mut SmallRng) -> u16 {
    rng.gen_range(1..=100)
}

fn operand(rng: &mut SmallRng) -> Operand {
    if rng.gen_bool(0.5) {
        Operand::Value(small_value(rng))
    } else {
        Operand::Var(var(rng))
    }
}

/// 2-aligned address within `[0, allocated_bytes)`.
fn aligned_address(rng: &mut SmallRng, allocated_bytes: usize) -> u32 {
    let slots = (allocated_bytes / 2).max(1) as u32;
    rng.gen_range(0..slots) * 2
}

fn generate_instruction(
    rng: &mut SmallRng,
    name: &str,
    allocated_bytes: usize,
    depth: usize,
) -> Instruction {
    let mut kind = draw_kind(rng);
    if kind == Kind::For && depth > MAX_FOR_DEPTH {
        kind = Kind::Add;
    }

    match kind {
        Kind::Declare => Instruction::Declare {
            var: var(rng),
            value: small_value(rng),
        },
        Kind::Add => Instruction::Add {
            dst: var(rng),
            lhs: Operand::Var(var(rng)),
            rhs: operand(rng),
        },
        Kind::Sub => Instruction::Sub {
            dst: var(rng),
            lhs: Operand::Var(var(rng)),
            rhs: operand(rng),
        },
        Kind::Print => {
            let with_var = rng.gen_range(0..3) == 0;
            Instruction::Print {
                message: format!("Hello world from {}!", name),
                var: with_var.then(|| var(rng)),
            }
        }
        Kind::Sleep => Instruction::Sleep {
            ticks: rng.gen_range(1..=5),
        },
        Kind::For => {
            let repeats = rng.gen_range(2..=5);
            let body_len = rng.gen_range(1..=2);
            let body = (0..body_len)
                .map(|_| generate_instruction(rng, name, allocated_bytes, depth + 1))
                .collect();
            Instruction::For { body, repeats }
        }
        Kind::Read => Instruction::Read {
            address: aligned_address(rng, allocated_bytes),
        },
        Kind::Write => Instruction::Write {
            address: aligned_address(rng, allocated_bytes),
            value: Operand::Value(small_value(rng)),
        },
    }
}
