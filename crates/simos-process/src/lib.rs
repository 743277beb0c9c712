//! SimOS process runtime
//!
//! The synthetic instruction set, its text parser, the weighted program
//! generator, the per-process record, and the step-wise interpreter that
//! drives instructions against the memory manager.

pub mod generator;
pub mod instruction;
pub mod interpreter;
pub mod process;

pub use generator::generate_program;
pub use instruction::{parse_instruction, Instruction, Operand, ParseError};
pub use interpreter::{step, StepOutcome};
pub use process::{Process, ProcessMetrics, ProcessState};
