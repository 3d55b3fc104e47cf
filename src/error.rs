//! Error taxonomy shared by the simulator core and the assembler.

use std::fmt;
use serde::{Serialize, Deserialize};
use thiserror::Error;

use crate::asm::AssemblerError;

/// Coarse classification used by the diagnostic log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    MemoryFault,
    InvalidInstruction,
    InvalidOperand,
    CapacityExceeded,
    UnknownAluOp,
    Config,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::MemoryFault => "MEMORY",
            ErrorKind::InvalidInstruction => "INSTRUCTION",
            ErrorKind::InvalidOperand => "OPERAND",
            ErrorKind::CapacityExceeded => "CAPACITY",
            ErrorKind::UnknownAluOp => "ALU",
            ErrorKind::Config => "CONFIG",
        };
        f.write_str(name)
    }
}

/// The kind of memory access that faulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Access {
    Fetch,
    Read,
    Write,
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Access::Fetch => "instruction fetch",
            Access::Read => "read",
            Access::Write => "write",
        })
    }
}

/// Errors raised by the simulator core.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SimError {
    #[error("invalid memory {access} at address {addr:#06x}{}", pc_suffix(.pc))]
    MemoryFault {
        addr: u32,
        access: Access,
        pc: Option<u16>,
    },

    #[error("unknown instruction {word:#06x} at PC {pc:#06x}")]
    InvalidInstruction { word: u16, pc: u16 },

    #[error("invalid operand: {message}")]
    InvalidOperand { line: usize, message: String },

    #[error("program of {size} words exceeds capacity of {capacity} words")]
    CapacityExceeded { size: usize, capacity: usize },

    #[error("program start address {start:#06x} outside memory of {capacity} words")]
    InvalidStartAddress { start: usize, capacity: usize },

    #[error("unknown ALU operation code {0:#05b}")]
    UnknownAluOp(u8),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

fn pc_suffix(pc: &Option<u16>) -> String {
    pc.map(|pc| format!(" (PC {pc:#06x})")).unwrap_or_default()
}

impl SimError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SimError::MemoryFault { .. } => ErrorKind::MemoryFault,
            SimError::InvalidInstruction { .. } => ErrorKind::InvalidInstruction,
            SimError::InvalidOperand { .. } => ErrorKind::InvalidOperand,
            SimError::CapacityExceeded { .. } | SimError::InvalidStartAddress { .. } => {
                ErrorKind::CapacityExceeded
            }
            SimError::UnknownAluOp(_) => ErrorKind::UnknownAluOp,
            SimError::InvalidConfig(_) => ErrorKind::Config,
        }
    }

    /// Program counter of the faulting instruction, if known.
    pub fn pc(&self) -> Option<u16> {
        match self {
            SimError::MemoryFault { pc, .. } => *pc,
            SimError::InvalidInstruction { pc, .. } => Some(*pc),
            _ => None,
        }
    }

    /// Raw instruction word involved, if any.
    pub fn word(&self) -> Option<u16> {
        match self {
            SimError::InvalidInstruction { word, .. } => Some(*word),
            _ => None,
        }
    }

    /// Attach the program counter of the instruction being executed.
    pub fn at_pc(self, at: u16) -> Self {
        match self {
            SimError::MemoryFault { addr, access, .. } => SimError::MemoryFault {
                addr,
                access,
                pc: Some(at),
            },
            other => other,
        }
    }
}

impl From<AssemblerError> for SimError {
    fn from(err: AssemblerError) -> Self {
        SimError::InvalidOperand {
            line: err.line(),
            message: err.to_string(),
        }
    }
}
