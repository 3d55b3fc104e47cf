//! Instruction decoder and encoder for RV16.
//!
//! Both directions are driven by [`ISA_TABLE`](crate::isa::ISA_TABLE) and
//! the per-format [`Layout`], so the assembler and the CPU can never
//! disagree about where a field lives.

use std::fmt;
use serde::{Serialize, Deserialize};

use crate::isa::{Field, Format, Layout, Opcode};

/// A decoded RV16 instruction.
///
/// Register fields are indices 0-15. Immediates keep the meaning of their
/// format: I/S offsets are unsigned, B/J offsets are signed word offsets
/// relative to the instruction's own address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Instruction {
    /// `rd = rs1 op rs2`
    R { op: Opcode, rd: u8, rs1: u8, rs2: u8 },

    /// `rd = rs1 op imm`, or `rd = mem[rs1 + imm]` for LW
    I { op: Opcode, rd: u8, rs1: u8, imm: u8 },

    /// `mem[rs1 + offset] = rs2`
    S { op: Opcode, rs2: u8, rs1: u8, offset: u8 },

    /// `if rs1 cmp rs2 { pc += offset }`
    B { op: Opcode, rs1: u8, rs2: u8, offset: i8 },

    /// `rd = pc + 1; pc += offset`
    J { op: Opcode, rd: u8, offset: i8 },

    /// NOP or HALT
    Special { op: Opcode },

    /// A word whose opcode slot is reserved, or a Special word with
    /// stray payload bits.
    Invalid { word: u16 },
}

fn reg(field: Option<Field>, word: u16) -> u8 {
    field.map_or(0, |f| f.extract(word) as u8)
}

fn imm(field: Option<Field>, word: u16) -> i32 {
    field.map_or(0, |f| f.extract(word))
}

/// Decode a 16-bit instruction word. Never fails: unknown encodings
/// come back as [`Instruction::Invalid`].
pub fn decode(word: u16) -> Instruction {
    let code = Field::OPCODE.bits(word) as u8;
    let Some(op) = Opcode::from_code(code) else {
        return Instruction::Invalid { word };
    };

    let layout = Layout::of(op.format());
    match op.format() {
        Format::R => Instruction::R {
            op,
            rd: reg(layout.rd, word),
            rs1: reg(layout.rs1, word),
            rs2: reg(layout.rs2, word),
        },
        Format::I => Instruction::I {
            op,
            rd: reg(layout.rd, word),
            rs1: reg(layout.rs1, word),
            imm: imm(layout.imm, word) as u8,
        },
        Format::S => Instruction::S {
            op,
            rs2: reg(layout.rs2, word),
            rs1: reg(layout.rs1, word),
            offset: imm(layout.imm, word) as u8,
        },
        Format::B => Instruction::B {
            op,
            rs1: reg(layout.rs1, word),
            rs2: reg(layout.rs2, word),
            offset: imm(layout.imm, word) as i8,
        },
        Format::J => Instruction::J {
            op,
            rd: reg(layout.rd, word),
            offset: imm(layout.imm, word) as i8,
        },
        Format::Special if Field::PAYLOAD.bits(word) != 0 => Instruction::Invalid { word },
        Format::Special => Instruction::Special { op },
    }
}

/// Encode an instruction into its 16-bit word. Field values wider than
/// their slot are truncated.
pub fn encode(instr: &Instruction) -> u16 {
    let Some(op) = instr.opcode() else {
        return match instr {
            Instruction::Invalid { word } => *word,
            _ => 0,
        };
    };

    let layout = Layout::of(op.format());
    let put = |field: Option<Field>, value: i32| field.map_or(0, |f| f.pack(value));

    let (rd, rs1, rs2, imm): (i32, i32, i32, i32) = match *instr {
        Instruction::R { rd, rs1, rs2, .. } => (rd.into(), rs1.into(), rs2.into(), 0),
        Instruction::I { rd, rs1, imm, .. } => (rd.into(), rs1.into(), 0, imm.into()),
        Instruction::S { rs2, rs1, offset, .. } => (0, rs1.into(), rs2.into(), offset.into()),
        Instruction::B { rs1, rs2, offset, .. } => (0, rs1.into(), rs2.into(), offset.into()),
        Instruction::J { rd, offset, .. } => (rd.into(), 0, 0, offset.into()),
        Instruction::Special { .. } | Instruction::Invalid { .. } => (0, 0, 0, 0),
    };

    Field::OPCODE.pack(op.code().into())
        | put(layout.rd, rd)
        | put(layout.rs1, rs1)
        | put(layout.rs2, rs2)
        | put(layout.imm, imm)
}

impl Instruction {
    pub fn opcode(&self) -> Option<Opcode> {
        match *self {
            Instruction::R { op, .. }
            | Instruction::I { op, .. }
            | Instruction::S { op, .. }
            | Instruction::B { op, .. }
            | Instruction::J { op, .. }
            | Instruction::Special { op } => Some(op),
            Instruction::Invalid { .. } => None,
        }
    }

    /// The raw word this instruction was decoded from.
    pub fn word(&self) -> u16 {
        match *self {
            Instruction::Invalid { word } => word,
            _ => encode(self),
        }
    }

    pub fn format(&self) -> Option<Format> {
        self.opcode().map(Opcode::format)
    }

    /// Upper-case mnemonic, `UNKNOWN` for invalid words.
    pub fn mnemonic(&self) -> &'static str {
        self.opcode().map_or("UNKNOWN", Opcode::mnemonic)
    }

    pub fn is_valid(&self) -> bool {
        !matches!(self, Instruction::Invalid { .. })
    }

    pub fn description(&self) -> &'static str {
        self.opcode().map_or("Unknown instruction", Opcode::description)
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.mnemonic().to_ascii_lowercase();
        match *self {
            Instruction::R { rd, rs1, rs2, .. } => write!(f, "{name} x{rd}, x{rs1}, x{rs2}"),
            Instruction::I { op: Opcode::Lw, rd, rs1, imm } => write!(f, "{name} x{rd}, {imm}(x{rs1})"),
            Instruction::I { rd, rs1, imm, .. } => write!(f, "{name} x{rd}, x{rs1}, {imm}"),
            Instruction::S { rs2, rs1, offset, .. } => write!(f, "{name} x{rs2}, {offset}(x{rs1})"),
            Instruction::B { rs1, rs2, offset, .. } => write!(f, "{name} x{rs1}, x{rs2}, {offset}"),
            Instruction::J { rd, offset, .. } => write!(f, "{name} x{rd}, {offset}"),
            Instruction::Special { .. } => f.write_str(&name),
            Instruction::Invalid { word } => write!(f, "unknown {word:#06X}"),
        }
    }
}
