//! Instruction set definition for the RV16 machine.
//!
//! This module is the single contract shared by the assembler and the
//! decoder:
//! - [`Opcode`] - the 4-bit opcode space and its mnemonics
//! - [`Format`] - the instruction format families (R/I/S/B/J/Special)
//! - [`Field`] / [`Layout`] - where each operand lives inside a 16-bit word

mod field;
mod opcode;

pub use field::{Field, Layout};
pub use opcode::{Format, Opcode, ISA_TABLE};

/// Width of every machine word and register, in bits.
pub const WORD_BITS: u32 = 16;

/// Mask that truncates a host integer to one machine word.
pub const WORD_MASK: u32 = (1 << WORD_BITS) - 1;

/// Number of architectural registers.
pub const NUM_REGISTERS: usize = 16;
