//! Assembler and disassembler for RV16 programs.
//!
//! This module provides:
//! - A two-pass assembler (text → 16-bit words)
//! - A disassembler (words → readable text)
//! - Binary and hex-dump program image formats

pub mod assembler;
pub mod binary;
pub mod disasm;

pub use assembler::{assemble, Assembly, AssemblerError, ListingEntry};
pub use binary::{from_bytes, hex_dump, load_binary, parse_hex_dump, save_binary, to_bytes, BinaryError};
pub use disasm::{disassemble, disassemble_word, listing};
