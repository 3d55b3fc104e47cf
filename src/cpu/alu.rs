//! Arithmetic logic unit.
//!
//! Seven operations over 16-bit operands selected by a 3-bit code.
//! Every operation updates the status flags:
//! - zero: the masked result is zero
//! - overflow: only ADD can set it, when the unmasked sum exceeds 0xFFFF
//! - negative: bit 15 of the result

use std::collections::VecDeque;
use std::fmt;
use serde::{Serialize, Deserialize};
use tracing::trace;

use crate::error::SimError;
use crate::isa::WORD_MASK;

const HISTORY_CAPACITY: usize = 10;

/// ALU operation selected by a 3-bit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum AluOp {
    Add = 0b000,
    Sub = 0b001,
    And = 0b010,
    Or = 0b011,
    Xor = 0b100,
    Eq = 0b101,
    Ne = 0b110,
}

impl AluOp {
    pub const ALL: [AluOp; 7] = [
        AluOp::Add, AluOp::Sub, AluOp::And, AluOp::Or, AluOp::Xor, AluOp::Eq, AluOp::Ne,
    ];

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.code() == code)
    }

    pub const fn code(self) -> u8 {
        self as u8
    }

    pub const fn name(self) -> &'static str {
        match self {
            AluOp::Add => "ADD",
            AluOp::Sub => "SUB",
            AluOp::And => "AND",
            AluOp::Or => "OR",
            AluOp::Xor => "XOR",
            AluOp::Eq => "EQ",
            AluOp::Ne => "NE",
        }
    }

    /// Pure evaluation: masked result plus the ADD carry-out.
    pub fn apply(self, a: u16, b: u16) -> (u16, bool) {
        match self {
            AluOp::Add => a.overflowing_add(b),
            AluOp::Sub => (a.wrapping_sub(b), false),
            AluOp::And => (a & b, false),
            AluOp::Or => (a | b, false),
            AluOp::Xor => (a ^ b, false),
            AluOp::Eq => (u16::from(a == b), false),
            AluOp::Ne => (u16::from(a != b), false),
        }
    }
}

impl TryFrom<u8> for AluOp {
    type Error = SimError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Self::from_code(code).ok_or(SimError::UnknownAluOp(code))
    }
}

impl fmt::Display for AluOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Status flags produced by the most recent operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flags {
    pub zero: bool,
    pub overflow: bool,
    pub negative: bool,
}

impl fmt::Display for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bit = |set: bool, c: char| if set { c } else { '-' };
        write!(f, "{}{}{}", bit(self.zero, 'Z'), bit(self.overflow, 'V'), bit(self.negative, 'N'))
    }
}

/// One completed ALU operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AluRecord {
    pub op: AluOp,
    pub a: u16,
    pub b: u16,
    pub result: u16,
    pub flags: Flags,
}

/// The ALU with its flags and a short operation history.
#[derive(Debug, Clone, Default)]
pub struct Alu {
    last_result: u16,
    flags: Flags,
    operations: u64,
    history: VecDeque<AluRecord>,
}

impl Alu {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `op` on operands masked to 16 bits, updating flags.
    pub fn execute(&mut self, a: u32, b: u32, op: AluOp) -> u16 {
        let a = (a & WORD_MASK) as u16;
        let b = (b & WORD_MASK) as u16;
        let (result, carry) = op.apply(a, b);

        self.flags = Flags {
            zero: result == 0,
            overflow: carry,
            negative: result & 0x8000 != 0,
        };
        self.last_result = result;
        self.operations += 1;

        if self.history.len() == HISTORY_CAPACITY {
            self.history.pop_front();
        }
        self.history.push_back(AluRecord { op, a, b, result, flags: self.flags });

        trace!(%op, a, b, result, flags = %self.flags, "alu");
        result
    }

    /// Like [`Alu::execute`], with the operation given as a raw 3-bit code.
    pub fn execute_code(&mut self, a: u32, b: u32, code: u8) -> Result<u16, SimError> {
        let op = AluOp::try_from(code)?;
        Ok(self.execute(a, b, op))
    }

    pub fn flags(&self) -> Flags {
        self.flags
    }

    pub fn last_result(&self) -> u16 {
        self.last_result
    }

    pub fn operation_count(&self) -> u64 {
        self.operations
    }

    /// Most recent operations, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &AluRecord> {
        self.history.iter()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_overflow() {
        let mut alu = Alu::new();
        assert_eq!(alu.execute(0xFFFF, 1, AluOp::Add), 0);
        assert_eq!(alu.flags(), Flags { zero: true, overflow: true, negative: false });

        assert_eq!(alu.execute(10, 20, AluOp::Add), 30);
        assert!(!alu.flags().overflow);
    }

    #[test]
    fn test_sub_wraps() {
        let mut alu = Alu::new();
        assert_eq!(alu.execute(0, 1, AluOp::Sub), 0xFFFF);
        assert_eq!(alu.flags(), Flags { zero: false, overflow: false, negative: true });
    }

    #[test]
    fn test_logic() {
        let mut alu = Alu::new();
        assert_eq!(alu.execute(0xF0F0, 0xFF00, AluOp::And), 0xF000);
        assert_eq!(alu.execute(0xF0F0, 0x0F0F, AluOp::Or), 0xFFFF);
        assert_eq!(alu.execute(0xFFFF, 0xFFFF, AluOp::Xor), 0);
        assert!(alu.flags().zero);
    }

    #[test]
    fn test_comparisons() {
        let mut alu = Alu::new();
        assert_eq!(alu.execute(5, 5, AluOp::Eq), 1);
        assert_eq!(alu.execute(5, 6, AluOp::Eq), 0);
        assert!(alu.flags().zero);
        assert_eq!(alu.execute(5, 6, AluOp::Ne), 1);
    }

    #[test]
    fn test_operands_masked() {
        let mut alu = Alu::new();
        assert_eq!(alu.execute(0x1_0001, 0x2_0002, AluOp::Add), 3);
        assert!(!alu.flags().overflow);
    }

    #[test]
    fn test_unknown_code() {
        let mut alu = Alu::new();
        assert_eq!(alu.execute_code(1, 2, 0b000), Ok(3));
        assert_eq!(alu.execute_code(1, 2, 0b111), Err(SimError::UnknownAluOp(7)));
        assert_eq!(alu.operation_count(), 1);
    }

    #[test]
    fn test_history_bounded() {
        let mut alu = Alu::new();
        for i in 0..25 {
            alu.execute(i, 1, AluOp::Add);
        }
        assert_eq!(alu.history().count(), HISTORY_CAPACITY);
        assert_eq!(alu.history().next().map(|r| r.a), Some(15));
        assert_eq!(alu.operation_count(), 25);

        alu.reset();
        assert_eq!(alu.history().count(), 0);
        assert_eq!(alu.flags(), Flags::default());
    }
}
