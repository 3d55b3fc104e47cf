//! CPU emulation for RV16.
//!
//! This module implements the complete RV16 datapath:
//! - 16 sixteen-bit registers with a hard-wired zero register
//! - a 7-operation ALU with zero/overflow/negative flags
//! - separate instruction and data memories (Harvard layout)
//! - a table-driven control unit and a fetch-decode-execute core

pub mod alu;
pub mod control;
pub mod decode;
pub mod diagnostics;
pub mod execute;
pub mod memory;
pub mod registers;

pub use alu::{Alu, AluOp, Flags};
pub use control::{ControlSignals, ControlUnit, PcUpdate};
pub use decode::{decode, encode, Instruction};
pub use diagnostics::{Diagnostic, ErrorHandler, ErrorPolicy};
pub use execute::{Cpu, CpuSnapshot, CpuState, ExecStats, TraceEntry};
pub use memory::{DataMemory, InstructionMemory, MemoryStats};
pub use registers::{Register, RegisterFile};
