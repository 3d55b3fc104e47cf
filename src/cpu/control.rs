//! Control unit.
//!
//! Maps each opcode to a fixed bundle of datapath control signals. The
//! mapping is a 16-entry table indexed by the opcode value; the reserved
//! slot, and any invalid word, gets a bundle that does nothing but
//! advance the program counter.

use std::collections::VecDeque;
use serde::{Serialize, Deserialize};
use tracing::trace;

use crate::cpu::alu::AluOp;
use crate::cpu::decode::Instruction;
use crate::isa::Opcode;

const HISTORY_CAPACITY: usize = 10;

/// Where an ALU operand comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperandSource {
    Register,
    Immediate,
}

/// What gets written back to `rd`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WriteBackSource {
    Alu,
    Memory,
    PcPlusOne,
}

/// How the program counter moves after execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PcUpdate {
    Increment,
    Conditional,
    Jump,
    Halt,
}

/// Data memory activity of an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemoryOp {
    None,
    Read,
    Write,
}

/// The full set of datapath control signals for one instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlSignals {
    pub alu_op: Option<AluOp>,
    pub alu_src_a: Option<OperandSource>,
    pub alu_src_b: Option<OperandSource>,
    pub reg_write: bool,
    pub reg_write_src: Option<WriteBackSource>,
    pub mem_read: bool,
    pub mem_write: bool,
    pub branch: bool,
    pub jump: bool,
    pub pc_update: PcUpdate,
    pub valid: bool,
}

impl ControlSignals {
    /// Signals for an undecodable word: touch nothing, advance the PC.
    pub const INVALID: ControlSignals = ControlSignals {
        alu_op: None,
        alu_src_a: None,
        alu_src_b: None,
        reg_write: false,
        reg_write_src: None,
        mem_read: false,
        mem_write: false,
        branch: false,
        jump: false,
        pc_update: PcUpdate::Increment,
        valid: false,
    };

    const NOP: ControlSignals = ControlSignals { valid: true, ..Self::INVALID };

    const fn alu(op: AluOp, src_b: OperandSource) -> Self {
        ControlSignals {
            alu_op: Some(op),
            alu_src_a: Some(OperandSource::Register),
            alu_src_b: Some(src_b),
            reg_write: true,
            reg_write_src: Some(WriteBackSource::Alu),
            ..Self::NOP
        }
    }

    const fn branch(op: AluOp) -> Self {
        ControlSignals {
            alu_op: Some(op),
            alu_src_a: Some(OperandSource::Register),
            alu_src_b: Some(OperandSource::Register),
            branch: true,
            pc_update: PcUpdate::Conditional,
            ..Self::NOP
        }
    }

    /// Signals for a defined opcode.
    pub const fn for_opcode(op: Opcode) -> Self {
        CONTROL_TABLE[op.code() as usize]
    }

    /// Signals for a decoded instruction.
    pub fn for_instruction(instr: &Instruction) -> Self {
        instr.opcode().map_or(Self::INVALID, Self::for_opcode)
    }

    pub fn is_branch(&self) -> bool {
        self.branch
    }

    pub fn is_jump(&self) -> bool {
        self.jump
    }

    pub fn accesses_memory(&self) -> bool {
        self.mem_read || self.mem_write
    }

    pub fn should_halt(&self) -> bool {
        self.pc_update == PcUpdate::Halt
    }

    pub fn memory_operation(&self) -> MemoryOp {
        match (self.mem_read, self.mem_write) {
            (true, _) => MemoryOp::Read,
            (_, true) => MemoryOp::Write,
            _ => MemoryOp::None,
        }
    }
}

/// Control bundles indexed by opcode value.
const CONTROL_TABLE: [ControlSignals; 16] = [
    /* 0x0 ADD  */ ControlSignals::alu(AluOp::Add, OperandSource::Register),
    /* 0x1 SUB  */ ControlSignals::alu(AluOp::Sub, OperandSource::Register),
    /* 0x2 AND  */ ControlSignals::alu(AluOp::And, OperandSource::Register),
    /* 0x3 OR   */ ControlSignals::alu(AluOp::Or, OperandSource::Register),
    /* 0x4 XOR  */ ControlSignals::alu(AluOp::Xor, OperandSource::Register),
    /* 0x5 ADDI */ ControlSignals::alu(AluOp::Add, OperandSource::Immediate),
    /* 0x6 ANDI */ ControlSignals::alu(AluOp::And, OperandSource::Immediate),
    /* 0x7 ORI  */ ControlSignals::alu(AluOp::Or, OperandSource::Immediate),
    /* 0x8 LW   */
    ControlSignals {
        reg_write_src: Some(WriteBackSource::Memory),
        mem_read: true,
        ..ControlSignals::alu(AluOp::Add, OperandSource::Immediate)
    },
    /* 0x9 SW   */
    ControlSignals {
        alu_op: Some(AluOp::Add),
        alu_src_a: Some(OperandSource::Register),
        alu_src_b: Some(OperandSource::Immediate),
        mem_write: true,
        ..ControlSignals::NOP
    },
    /* 0xA BEQ  */ ControlSignals::branch(AluOp::Eq),
    /* 0xB BNE  */ ControlSignals::branch(AluOp::Ne),
    /* 0xC JAL  */
    ControlSignals {
        reg_write: true,
        reg_write_src: Some(WriteBackSource::PcPlusOne),
        jump: true,
        pc_update: PcUpdate::Jump,
        ..ControlSignals::NOP
    },
    /* 0xD      */ ControlSignals::INVALID,
    /* 0xE NOP  */ ControlSignals::NOP,
    /* 0xF HALT */ ControlSignals { pc_update: PcUpdate::Halt, ..ControlSignals::NOP },
];

/// One generated bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ControlRecord {
    pub mnemonic: &'static str,
    pub signals: ControlSignals,
}

/// Control unit with generation statistics.
#[derive(Debug, Clone, Default)]
pub struct ControlUnit {
    generated: u64,
    history: VecDeque<ControlRecord>,
}

impl ControlUnit {
    pub fn new() -> Self {
        Self::default()
    }

    /// Produce the control bundle for `instr` and log it.
    pub fn generate_control_signals(&mut self, instr: &Instruction) -> ControlSignals {
        let signals = ControlSignals::for_instruction(instr);
        self.generated += 1;
        if self.history.len() == HISTORY_CAPACITY {
            self.history.pop_front();
        }
        self.history.push_back(ControlRecord { mnemonic: instr.mnemonic(), signals });
        trace!(mnemonic = instr.mnemonic(), pc_update = ?signals.pc_update, "control");
        signals
    }

    pub fn generated(&self) -> u64 {
        self.generated
    }

    pub fn history(&self) -> impl Iterator<Item = &ControlRecord> {
        self.history.iter()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
