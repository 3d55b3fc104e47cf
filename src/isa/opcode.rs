//! The 4-bit opcode space.

use std::fmt;
use serde::{Serialize, Deserialize};

/// Instruction format families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Format {
    /// Register-register: `op rd, rs1, rs2`
    R,
    /// Register-immediate and loads: `op rd, rs1, imm` / `lw rd, off(rs1)`
    I,
    /// Stores: `sw rs2, off(rs1)`
    S,
    /// Conditional branches: `op rs1, rs2, target`
    B,
    /// Jump and link: `jal rd, target`
    J,
    /// No operands: `nop`, `halt`
    Special,
}

impl Format {
    pub const ALL: [Format; 6] = [
        Format::R,
        Format::I,
        Format::S,
        Format::B,
        Format::J,
        Format::Special,
    ];

    /// Short tag used in listings ("R", "I", ..., "Special").
    pub const fn tag(self) -> &'static str {
        match self {
            Format::R => "R",
            Format::I => "I",
            Format::S => "S",
            Format::B => "B",
            Format::J => "J",
            Format::Special => "Special",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// A defined opcode. The discriminant is the value of bits 15-12.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Opcode {
    Add = 0x0,
    Sub = 0x1,
    And = 0x2,
    Or = 0x3,
    Xor = 0x4,
    Addi = 0x5,
    Andi = 0x6,
    Ori = 0x7,
    Lw = 0x8,
    Sw = 0x9,
    Beq = 0xA,
    Bne = 0xB,
    Jal = 0xC,
    Nop = 0xE,
    Halt = 0xF,
}

/// Opcode slot table, indexed by the 4-bit opcode field.
///
/// Reserved slots are `None`; the decoder turns them into invalid
/// instructions and the assembler can never produce them.
pub const ISA_TABLE: [Option<Opcode>; 16] = [
    Some(Opcode::Add),
    Some(Opcode::Sub),
    Some(Opcode::And),
    Some(Opcode::Or),
    Some(Opcode::Xor),
    Some(Opcode::Addi),
    Some(Opcode::Andi),
    Some(Opcode::Ori),
    Some(Opcode::Lw),
    Some(Opcode::Sw),
    Some(Opcode::Beq),
    Some(Opcode::Bne),
    Some(Opcode::Jal),
    None,
    Some(Opcode::Nop),
    Some(Opcode::Halt),
];

impl Opcode {
    /// Look up the opcode stored in a 4-bit slot.
    #[inline]
    pub const fn from_code(code: u8) -> Option<Self> {
        ISA_TABLE[(code & 0xF) as usize]
    }

    /// The 4-bit opcode value.
    #[inline]
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Upper-case mnemonic.
    pub const fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Add => "ADD",
            Opcode::Sub => "SUB",
            Opcode::And => "AND",
            Opcode::Or => "OR",
            Opcode::Xor => "XOR",
            Opcode::Addi => "ADDI",
            Opcode::Andi => "ANDI",
            Opcode::Ori => "ORI",
            Opcode::Lw => "LW",
            Opcode::Sw => "SW",
            Opcode::Beq => "BEQ",
            Opcode::Bne => "BNE",
            Opcode::Jal => "JAL",
            Opcode::Nop => "NOP",
            Opcode::Halt => "HALT",
        }
    }

    /// Format family, which fixes the field layout.
    pub const fn format(self) -> Format {
        match self {
            Opcode::Add | Opcode::Sub | Opcode::And | Opcode::Or | Opcode::Xor => Format::R,
            Opcode::Addi | Opcode::Andi | Opcode::Ori | Opcode::Lw => Format::I,
            Opcode::Sw => Format::S,
            Opcode::Beq | Opcode::Bne => Format::B,
            Opcode::Jal => Format::J,
            Opcode::Nop | Opcode::Halt => Format::Special,
        }
    }

    pub const fn description(self) -> &'static str {
        match self {
            Opcode::Add => "Add",
            Opcode::Sub => "Subtract",
            Opcode::And => "Bitwise AND",
            Opcode::Or => "Bitwise OR",
            Opcode::Xor => "Bitwise XOR",
            Opcode::Addi => "Add Immediate",
            Opcode::Andi => "AND Immediate",
            Opcode::Ori => "OR Immediate",
            Opcode::Lw => "Load Word",
            Opcode::Sw => "Store Word",
            Opcode::Beq => "Branch if Equal",
            Opcode::Bne => "Branch if Not Equal",
            Opcode::Jal => "Jump and Link",
            Opcode::Nop => "No Operation",
            Opcode::Halt => "Halt Execution",
        }
    }

    /// Resolve a mnemonic, ignoring case.
    pub fn from_mnemonic(name: &str) -> Option<Self> {
        Self::all().find(|op| op.mnemonic().eq_ignore_ascii_case(name))
    }

    /// Every defined opcode, in opcode order.
    pub fn all() -> impl Iterator<Item = Opcode> {
        ISA_TABLE.iter().flatten().copied()
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_matches_discriminants() {
        for (code, slot) in ISA_TABLE.iter().enumerate() {
            if let Some(op) = slot {
                assert_eq!(op.code() as usize, code, "{op} sits in the wrong slot");
            }
        }
    }

    #[test]
    fn test_reserved_slot() {
        assert_eq!(Opcode::from_code(0xD), None);
        assert_eq!(Opcode::all().count(), 15);
    }

    #[test]
    fn test_mnemonic_lookup_is_case_insensitive() {
        assert_eq!(Opcode::from_mnemonic("addi"), Some(Opcode::Addi));
        assert_eq!(Opcode::from_mnemonic("HaLt"), Some(Opcode::Halt));
        assert_eq!(Opcode::from_mnemonic("mul"), None);
    }

    #[test]
    fn test_formats() {
        assert_eq!(Opcode::Lw.format(), Format::I);
        assert_eq!(Opcode::Sw.format(), Format::S);
        assert_eq!(Opcode::Jal.format(), Format::J);
        assert_eq!(Opcode::Nop.format(), Format::Special);
    }
}
