//! Bit-field layout of 16-bit instruction words.
//!
//! Every word keeps its opcode in bits 15-12. The remaining 12 bits are
//! split according to the instruction format:
//!
//! ```text
//! Format   | 11-8 | 7-4          | 3-0
//! ---------+------+--------------+--------------
//! R        | rd   | rs1          | rs2
//! I        | rd   | rs1          | imm (unsigned)
//! S        | rs2  | rs1          | offset (unsigned)
//! B        | rs1  | rs2          | offset (signed)
//! J        | rd   | offset (signed, bits 7-0)
//! Special  | zero
//! ```

use super::opcode::Format;

/// A contiguous bit field inside an instruction word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    /// Position of the least significant bit.
    pub shift: u8,
    /// Number of bits.
    pub width: u8,
    /// Whether the field holds a two's-complement value.
    pub signed: bool,
}

impl Field {
    /// Bits 15-12.
    pub const OPCODE: Field = Field::unsigned(12, 4);
    /// Bits 11-8.
    pub const HIGH: Field = Field::unsigned(8, 4);
    /// Bits 7-4.
    pub const MID: Field = Field::unsigned(4, 4);
    /// Bits 3-0, unsigned.
    pub const LOW: Field = Field::unsigned(0, 4);
    /// Bits 3-0, sign-extended (branch offsets).
    pub const LOW_SIGNED: Field = Field::signed(0, 4);
    /// Bits 7-0, sign-extended (jump offsets).
    pub const WIDE_SIGNED: Field = Field::signed(0, 8);
    /// Bits 11-0 (must be zero in Special words).
    pub const PAYLOAD: Field = Field::unsigned(0, 12);

    /// An unsigned field.
    pub const fn unsigned(shift: u8, width: u8) -> Self {
        Self { shift, width, signed: false }
    }

    /// A two's-complement field.
    pub const fn signed(shift: u8, width: u8) -> Self {
        Self { shift, width, signed: true }
    }

    /// Mask of `width` low bits.
    #[inline]
    pub const fn mask(&self) -> u16 {
        ((1u32 << self.width) - 1) as u16
    }

    /// Raw bits of the field, right-aligned.
    #[inline]
    pub const fn bits(&self, word: u16) -> u16 {
        (word >> self.shift) & self.mask()
    }

    /// Field value, sign-extended when the field is signed.
    #[inline]
    pub const fn extract(&self, word: u16) -> i32 {
        let raw = self.bits(word) as i32;
        if self.signed && raw & (1 << (self.width - 1)) != 0 {
            raw - (1 << self.width)
        } else {
            raw
        }
    }

    /// Place `value` into the field. The value is truncated to the field
    /// width (two's complement for negative values).
    #[inline]
    pub const fn pack(&self, value: i32) -> u16 {
        ((value as u32 as u16) & self.mask()) << self.shift
    }

    /// Inclusive range of values the field can represent.
    pub const fn range(&self) -> (i32, i32) {
        if self.signed {
            (-(1 << (self.width - 1)), (1 << (self.width - 1)) - 1)
        } else {
            (0, (1 << self.width) - 1)
        }
    }

    /// Whether `value` survives a pack/extract cycle unchanged.
    pub const fn fits(&self, value: i32) -> bool {
        let (lo, hi) = self.range();
        value >= lo && value <= hi
    }
}

/// Which fields a format uses, keyed by operand role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Layout {
    pub rd: Option<Field>,
    pub rs1: Option<Field>,
    pub rs2: Option<Field>,
    /// Immediate or offset field.
    pub imm: Option<Field>,
}

impl Layout {
    /// The layout of a format.
    pub const fn of(format: Format) -> Self {
        match format {
            Format::R => Layout {
                rd: Some(Field::HIGH),
                rs1: Some(Field::MID),
                rs2: Some(Field::LOW),
                imm: None,
            },
            Format::I => Layout {
                rd: Some(Field::HIGH),
                rs1: Some(Field::MID),
                rs2: None,
                imm: Some(Field::LOW),
            },
            Format::S => Layout {
                rd: None,
                rs1: Some(Field::MID),
                rs2: Some(Field::HIGH),
                imm: Some(Field::LOW),
            },
            Format::B => Layout {
                rd: None,
                rs1: Some(Field::HIGH),
                rs2: Some(Field::MID),
                imm: Some(Field::LOW_SIGNED),
            },
            Format::J => Layout {
                rd: Some(Field::HIGH),
                rs1: None,
                rs2: None,
                imm: Some(Field::WIDE_SIGNED),
            },
            Format::Special => Layout {
                rd: None,
                rs1: None,
                rs2: None,
                imm: None,
            },
        }
    }
}
