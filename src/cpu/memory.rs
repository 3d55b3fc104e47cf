//! Harvard memories.
//!
//! Instructions and data live in separate word-addressed stores:
//! - instruction memory is indexed directly by the program counter
//! - data memory answers to logical addresses starting at a base
//!   (0x1000 by default), so address `base + i` is physical word `i`
//!
//! Out-of-range accesses never panic; they return a [`SimError::MemoryFault`]
//! and the CPU decides how to surface it.

use std::fmt;
use serde::{Serialize, Deserialize};
use tracing::debug;

use crate::error::{Access, SimError};
use crate::isa::WORD_MASK;

/// Read-mostly store holding the loaded program.
#[derive(Clone, PartialEq, Eq)]
pub struct InstructionMemory {
    words: Vec<u16>,
    program_start: usize,
    program_size: usize,
}

impl InstructionMemory {
    /// Create a zeroed instruction memory of `size` words.
    pub fn new(size: usize) -> Self {
        Self { words: vec![0; size], program_start: 0, program_size: 0 }
    }

    pub fn size(&self) -> usize {
        self.words.len()
    }

    pub fn program_start(&self) -> usize {
        self.program_start
    }

    pub fn program_size(&self) -> usize {
        self.program_size
    }

    /// First address past the loaded program.
    pub fn program_end(&self) -> usize {
        self.program_start + self.program_size
    }

    /// Clear memory, then copy `program` in starting at `start`.
    ///
    /// Fails without touching memory when the program does not fit.
    pub fn load_program(&mut self, program: &[u16], start: usize) -> Result<(), SimError> {
        let capacity = self.words.len();
        if start >= capacity {
            return Err(SimError::InvalidStartAddress { start, capacity });
        }
        if program.len() > capacity - start {
            return Err(SimError::CapacityExceeded { size: program.len(), capacity: capacity - start });
        }

        self.words.fill(0);
        self.words[start..start + program.len()].copy_from_slice(program);
        self.program_start = start;
        self.program_size = program.len();
        debug!(start, size = program.len(), "program loaded");
        Ok(())
    }

    /// Fetch the word at `addr`.
    pub fn read_instruction(&self, addr: u16) -> Result<u16, SimError> {
        self.words
            .get(usize::from(addr))
            .copied()
            .ok_or(SimError::MemoryFault { addr: u32::from(addr), access: Access::Fetch, pc: Some(addr) })
    }

    /// `(address, word)` pairs for `count` words from `start`, clipped to memory.
    pub fn dump(&self, start: usize, count: usize) -> Vec<(usize, u16)> {
        self.words
            .iter()
            .copied()
            .enumerate()
            .skip(start)
            .take(count)
            .collect()
    }

    pub fn as_slice(&self) -> &[u16] {
        &self.words
    }

    pub fn clear(&mut self) {
        self.words.fill(0);
        self.program_start = 0;
        self.program_size = 0;
    }
}

impl fmt::Debug for InstructionMemory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstructionMemory")
            .field("size", &self.words.len())
            .field("program", &(self.program_start..self.program_end()))
            .finish()
    }
}

/// Access counters for data memory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryStats {
    pub reads: u64,
    pub writes: u64,
}

impl MemoryStats {
    pub fn accesses(&self) -> u64 {
        self.reads + self.writes
    }
}

/// Read/write store for data.
#[derive(Clone, PartialEq, Eq)]
pub struct DataMemory {
    base: u16,
    words: Vec<u16>,
    stats: MemoryStats,
}

impl DataMemory {
    /// Create a zeroed data memory of `size` words at logical `base`.
    pub fn new(size: usize, base: u16) -> Self {
        Self { base, words: vec![0; size], stats: MemoryStats::default() }
    }

    pub fn base(&self) -> u16 {
        self.base
    }

    pub fn size(&self) -> usize {
        self.words.len()
    }

    fn index(&self, addr: u32) -> Option<usize> {
        let offset = addr.checked_sub(u32::from(self.base))?;
        let offset = usize::try_from(offset).ok()?;
        (offset < self.words.len()).then_some(offset)
    }

    /// Whether `addr` falls inside `[base, base + size)`.
    pub fn contains(&self, addr: u32) -> bool {
        self.index(addr).is_some()
    }

    /// Read the word at logical address `addr`.
    pub fn read_word(&mut self, addr: u32) -> Result<u16, SimError> {
        let index = self
            .index(addr)
            .ok_or(SimError::MemoryFault { addr, access: Access::Read, pc: None })?;
        self.stats.reads += 1;
        Ok(self.words[index])
    }

    /// Write `value`, masked to 16 bits, at logical address `addr`.
    pub fn write_word(&mut self, addr: u32, value: u32) -> Result<(), SimError> {
        let index = self
            .index(addr)
            .ok_or(SimError::MemoryFault { addr, access: Access::Write, pc: None })?;
        self.words[index] = (value & WORD_MASK) as u16;
        self.stats.writes += 1;
        Ok(())
    }

    /// Inspect a word without counting an access.
    pub fn peek(&self, addr: u32) -> Option<u16> {
        self.index(addr).map(|i| self.words[i])
    }

    /// Non-zero words as `(logical address, value)` pairs, ascending.
    pub fn find_non_zero(&self) -> Vec<(u32, u16)> {
        self.words
            .iter()
            .enumerate()
            .filter(|(_, &w)| w != 0)
            .map(|(i, &w)| (u32::from(self.base) + i as u32, w))
            .collect()
    }

    pub fn stats(&self) -> MemoryStats {
        self.stats
    }

    /// Zero all words and the access counters.
    pub fn clear(&mut self) {
        self.words.fill(0);
        self.stats = MemoryStats::default();
    }
}

impl fmt::Debug for DataMemory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let non_zero = self.words.iter().filter(|&&w| w != 0).count();
        write!(
            f,
            "DataMemory({:#06x}..{:#06x}, {} non-zero)",
            self.base,
            u32::from(self.base) + self.words.len() as u32,
            non_zero
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_and_fetch() {
        let mut imem = InstructionMemory::new(8);
        imem.load_program(&[0x510A, 0xF000], 2).unwrap();
        assert_eq!(imem.read_instruction(2), Ok(0x510A));
        assert_eq!(imem.read_instruction(3), Ok(0xF000));
        assert_eq!(imem.read_instruction(0), Ok(0));
        assert_eq!(imem.program_end(), 4);
        assert_eq!(imem.dump(1, 3), vec![(1, 0), (2, 0x510A), (3, 0xF000)]);
        assert_eq!(imem.dump(7, 5), vec![(7, 0)]);
    }

    #[test]
    fn test_load_clears_previous_program() {
        let mut imem = InstructionMemory::new(4);
        imem.load_program(&[1, 2, 3, 4], 0).unwrap();
        imem.load_program(&[9], 0).unwrap();
        assert_eq!(imem.as_slice(), &[9, 0, 0, 0]);
    }

    #[test]
    fn test_load_rejects_oversized() {
        let mut imem = InstructionMemory::new(4);
        imem.load_program(&[7], 0).unwrap();
        assert_eq!(
            imem.load_program(&[1, 2, 3], 2),
            Err(SimError::CapacityExceeded { size: 3, capacity: 2 })
        );
        assert!(matches!(imem.load_program(&[], 4), Err(SimError::InvalidStartAddress { .. })));
        assert_eq!(imem.read_instruction(0), Ok(7));
    }

    #[test]
    fn test_fetch_out_of_range() {
        let imem = InstructionMemory::new(4);
        assert!(matches!(
            imem.read_instruction(4),
            Err(SimError::MemoryFault { addr: 4, access: Access::Fetch, .. })
        ));
    }

    #[test]
    fn test_data_window() {
        let mut dmem = DataMemory::new(16, 0x1000);
        dmem.write_word(0x1000, 0x1_ABCD).unwrap();
        assert_eq!(dmem.read_word(0x1000), Ok(0xABCD));
        assert_eq!(dmem.peek(0x100F), Some(0));
        assert_eq!(dmem.peek(0x1010), None);
        assert!(dmem.read_word(0x0FFF).is_err());
        assert!(dmem.write_word(0x1010, 1).is_err());
        assert_eq!(dmem.stats(), MemoryStats { reads: 1, writes: 1 });
    }

    #[test]
    fn test_find_non_zero() {
        let mut dmem = DataMemory::new(16, 0x1000);
        dmem.write_word(0x1003, 3).unwrap();
        dmem.write_word(0x1001, 1).unwrap();
        assert_eq!(dmem.find_non_zero(), vec![(0x1001, 1), (0x1003, 3)]);

        dmem.clear();
        assert!(dmem.find_non_zero().is_empty());
        assert_eq!(dmem.stats().accesses(), 0);
    }
}
