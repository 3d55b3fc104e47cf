//! RV16 register file.
//!
//! Sixteen 16-bit general-purpose registers, `x0` through `x15`:
//! - `x0` (`zero`) is hard-wired to zero; writes are silently dropped
//! - every register also answers to a RISC-V style ABI alias
//! - values are masked to 16 bits on write

use std::fmt;
use serde::Serialize;
use tracing::{trace, warn};

use crate::isa::{NUM_REGISTERS, WORD_MASK};

/// Architectural name, ABI alias and purpose of each register.
pub const ABI_NAMES: [(&str, &str, &str); NUM_REGISTERS] = [
    ("x0", "zero", "Hard-wired zero"),
    ("x1", "ra", "Return address"),
    ("x2", "sp", "Stack pointer"),
    ("x3", "gp", "Global pointer"),
    ("x4", "tp", "Thread pointer"),
    ("x5", "t0", "Temporary register 0"),
    ("x6", "t1", "Temporary register 1"),
    ("x7", "t2", "Temporary register 2"),
    ("x8", "s0", "Saved register 0 / frame pointer"),
    ("x9", "s1", "Saved register 1"),
    ("x10", "a0", "Function argument 0 / return value"),
    ("x11", "a1", "Function argument 1"),
    ("x12", "a2", "Function argument 2"),
    ("x13", "a3", "Function argument 3"),
    ("x14", "a4", "Function argument 4"),
    ("x15", "a7", "System call number"),
];

/// One architectural register together with its metadata.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct Register {
    index: usize,
    name: &'static str,
    abi_name: &'static str,
    purpose: &'static str,
    value: u16,
}

impl Register {
    fn new(index: usize) -> Self {
        let (name, abi_name, purpose) = ABI_NAMES[index];
        Self { index, name, abi_name, purpose, value: 0 }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn abi_name(&self) -> &'static str {
        self.abi_name
    }

    pub fn purpose(&self) -> &'static str {
        self.purpose
    }

    /// `x0` ignores writes.
    pub fn is_read_only(&self) -> bool {
        self.index == 0
    }

    pub fn value(&self) -> u16 {
        self.value
    }
}

impl fmt::Debug for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})={:#06x}", self.name, self.abi_name, self.value)
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:>3}({:<4}): {:#06x} ({:>5}) - {}",
            self.name, self.abi_name, self.value, self.value, self.purpose
        )
    }
}

/// The RV16 register file.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct RegisterFile {
    regs: [Register; NUM_REGISTERS],
}

impl RegisterFile {
    /// Create a register file with every register zeroed.
    pub fn new() -> Self {
        Self { regs: std::array::from_fn(Register::new) }
    }

    /// Zero every register.
    pub fn reset_all(&mut self) {
        for reg in &mut self.regs {
            reg.value = 0;
        }
    }

    /// Read a register by index. Invalid indices read as zero.
    pub fn read(&self, index: usize) -> u16 {
        match self.regs.get(index) {
            Some(reg) => reg.value,
            None => {
                warn!(index, "read from invalid register");
                0
            }
        }
    }

    /// Write a register by index, masking the value to 16 bits.
    ///
    /// Returns `false` when nothing was stored: writes to `x0` are
    /// dropped silently, invalid indices are reported.
    pub fn write(&mut self, index: usize, value: u32) -> bool {
        let Some(reg) = self.regs.get_mut(index) else {
            warn!(index, "write to invalid register");
            return false;
        };
        if reg.is_read_only() {
            trace!(value, "write to x0 ignored");
            return false;
        }
        reg.value = (value & WORD_MASK) as u16;
        true
    }

    /// Read a register by architectural name or ABI alias.
    pub fn read_named(&self, name: &str) -> u16 {
        match Self::index_of(name) {
            Some(index) => self.read(index),
            None => {
                warn!(name, "read from unknown register");
                0
            }
        }
    }

    /// Write a register by architectural name or ABI alias.
    pub fn write_named(&mut self, name: &str, value: u32) -> bool {
        match Self::index_of(name) {
            Some(index) => self.write(index, value),
            None => {
                warn!(name, "write to unknown register");
                false
            }
        }
    }

    /// Resolve `x0`..`x15` or an ABI alias, case-insensitively.
    pub fn index_of(name: &str) -> Option<usize> {
        let lower = name.trim().to_ascii_lowercase();
        if let Some(digits) = lower.strip_prefix('x') {
            if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
                return digits.parse::<usize>().ok().filter(|&i| i < NUM_REGISTERS);
            }
        }
        ABI_NAMES.iter().position(|(_, abi, _)| *abi == lower)
    }

    /// Register metadata by index.
    pub fn get(&self, index: usize) -> Option<&Register> {
        self.regs.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Register> {
        self.regs.iter()
    }

    /// All sixteen values, `x0` first.
    pub fn snapshot(&self) -> [u16; NUM_REGISTERS] {
        std::array::from_fn(|i| self.regs[i].value)
    }

    /// Registers holding a non-zero value.
    pub fn non_zero(&self) -> Vec<(usize, u16)> {
        self.regs
            .iter()
            .filter(|r| r.value != 0)
            .map(|r| (r.index, r.value))
            .collect()
    }
}

impl Default for RegisterFile {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RegisterFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.regs.iter().filter(|r| r.value != 0)).finish()
    }
}

impl fmt::Display for RegisterFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for reg in &self.regs {
            writeln!(f, "{reg}")?;
        }
        Ok(())
    }
}
