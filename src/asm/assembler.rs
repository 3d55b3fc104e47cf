//! Two-pass assembler for RV16 programs.
//!
//! Syntax:
//! ```text
//! # Comment
//! loop:                     # label on its own line
//!     addi t0, zero, 1      # register-immediate (0..15)
//!     sw   t0, 2(sp)        # memory operand: offset(reg)
//!     bne  a0, zero, loop   # branch to a label or a literal offset
//! done: halt
//! ```
//!
//! Mnemonics and register names are case-insensitive; labels are not.
//! A bad line is reported and skipped, the rest of the program still
//! assembles.

use std::collections::HashMap;
use std::fmt;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::cpu::decode::{encode, Instruction};
use crate::cpu::registers::RegisterFile;
use crate::isa::{Field, Format, Layout, Opcode};

/// Assemble source text.
pub fn assemble(source: &str) -> Assembly {
    let mut asm = Assembler::new();
    asm.scan(source);
    asm.finish()
}

/// Result of one assembly run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Assembly {
    /// Machine words in program order.
    pub words: Vec<u16>,
    /// Label name to instruction address.
    pub labels: HashMap<String, u16>,
    /// One entry per emitted word.
    pub listing: Vec<ListingEntry>,
    /// Per-line failures, in source order.
    pub errors: Vec<AssemblerError>,
}

impl Assembly {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn label(&self, name: &str) -> Option<u16> {
        self.labels.get(name).copied()
    }

    /// The words, or every error if any line failed.
    pub fn into_result(self) -> Result<Vec<u16>, Vec<AssemblerError>> {
        if self.errors.is_empty() {
            Ok(self.words)
        } else {
            Err(self.errors)
        }
    }
}

/// A source line and the word it produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListingEntry {
    /// Address assigned in the first pass.
    pub address: u16,
    pub line: usize,
    pub source: String,
    pub word: u16,
}

impl fmt::Display for ListingEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04X}: {:04X}  {:>4} | {}", self.address, self.word, self.line, self.source)
    }
}

/// Errors that can occur during assembly. Each one belongs to a line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssemblerError {
    #[error("unknown mnemonic on line {line}: {mnemonic}")]
    UnknownMnemonic { line: usize, mnemonic: String },

    #[error("wrong operand count on line {line}: {mnemonic} takes {expected}, got {found}")]
    OperandCount { line: usize, mnemonic: &'static str, expected: usize, found: usize },

    #[error("invalid register on line {line}: {name}")]
    InvalidRegister { line: usize, name: String },

    #[error("invalid number on line {line}: {text}")]
    InvalidNumber { line: usize, text: String },

    #[error("value out of range on line {line}: {value} not in {min}..={max}")]
    ValueOutOfRange { line: usize, value: i32, min: i32, max: i32 },

    #[error("invalid memory operand on line {line}: {operand} (expected offset(reg))")]
    InvalidMemoryOperand { line: usize, operand: String },

    #[error("undefined label on line {line}: {label}")]
    UndefinedLabel { line: usize, label: String },

    #[error("invalid label on line {line}: {label}")]
    InvalidLabel { line: usize, label: String },

    #[error("duplicate label on line {line}: {label} (first defined on line {first})")]
    DuplicateLabel { line: usize, label: String, first: usize },

    #[error("program too large on line {line}: address space exhausted")]
    ProgramTooLarge { line: usize },
}

impl AssemblerError {
    /// 1-based source line.
    pub fn line(&self) -> usize {
        match self {
            AssemblerError::UnknownMnemonic { line, .. }
            | AssemblerError::OperandCount { line, .. }
            | AssemblerError::InvalidRegister { line, .. }
            | AssemblerError::InvalidNumber { line, .. }
            | AssemblerError::ValueOutOfRange { line, .. }
            | AssemblerError::InvalidMemoryOperand { line, .. }
            | AssemblerError::UndefinedLabel { line, .. }
            | AssemblerError::InvalidLabel { line, .. }
            | AssemblerError::DuplicateLabel { line, .. }
            | AssemblerError::ProgramTooLarge { line } => *line,
        }
    }
}

/// An instruction line found by the first pass.
struct SourceLine<'a> {
    line: usize,
    address: u16,
    text: &'a str,
}

/// The assembler state.
struct Assembler<'a> {
    /// Symbol table (label -> address).
    labels: HashMap<String, u16>,
    /// Line of each label's definition.
    defined_at: HashMap<String, usize>,
    /// Instruction lines in address order.
    lines: Vec<SourceLine<'a>>,
    errors: Vec<AssemblerError>,
}

impl<'a> Assembler<'a> {
    fn new() -> Self {
        Self {
            labels: HashMap::new(),
            defined_at: HashMap::new(),
            lines: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Pass 1: assign addresses and collect labels.
    fn scan(&mut self, source: &'a str) {
        let mut address: u32 = 0;

        for (index, raw) in source.lines().enumerate() {
            let line = index + 1;
            let text = match raw.find('#') {
                Some(idx) => &raw[..idx],
                None => raw,
            }
            .trim();

            let text = match text.split_once(':') {
                Some((label, rest)) => {
                    self.define_label(label.trim(), address, line);
                    rest.trim()
                }
                None => text,
            };
            if text.is_empty() {
                continue;
            }

            match u16::try_from(address) {
                Ok(address) => self.lines.push(SourceLine { line, address, text }),
                Err(_) => {
                    self.errors.push(AssemblerError::ProgramTooLarge { line });
                    continue;
                }
            }
            address += 1;
        }
    }

    fn define_label(&mut self, label: &str, address: u32, line: usize) {
        if !is_valid_label(label) {
            self.errors.push(AssemblerError::InvalidLabel { line, label: label.to_string() });
            return;
        }
        let Ok(address) = u16::try_from(address) else {
            self.errors.push(AssemblerError::ProgramTooLarge { line });
            return;
        };
        if let Some(&first) = self.defined_at.get(label) {
            self.errors.push(AssemblerError::DuplicateLabel { line, label: label.to_string(), first });
            return;
        }
        self.labels.insert(label.to_string(), address);
        self.defined_at.insert(label.to_string(), line);
    }

    /// Pass 2: encode every instruction line.
    fn finish(mut self) -> Assembly {
        let mut words = Vec::with_capacity(self.lines.len());
        let mut listing = Vec::with_capacity(self.lines.len());
        let mut errors = std::mem::take(&mut self.errors);

        for src in &self.lines {
            match self.encode_line(src) {
                Ok(instr) => {
                    let word = encode(&instr);
                    words.push(word);
                    listing.push(ListingEntry {
                        address: src.address,
                        line: src.line,
                        source: src.text.to_string(),
                        word,
                    });
                }
                Err(err) => {
                    warn!(line = src.line, "{err}");
                    errors.push(err);
                }
            }
        }
        errors.sort_by_key(AssemblerError::line);

        debug!(words = words.len(), labels = self.labels.len(), errors = errors.len(), "assembled");
        Assembly { words, labels: self.labels, listing, errors }
    }

    fn encode_line(&self, src: &SourceLine<'_>) -> Result<Instruction, AssemblerError> {
        let line = src.line;
        let mut tokens = src
            .text
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|t| !t.is_empty());

        let name = tokens.next().unwrap_or_default();
        let op = Opcode::from_mnemonic(name)
            .ok_or_else(|| AssemblerError::UnknownMnemonic { line, mnemonic: name.to_string() })?;
        let operands: Vec<&str> = tokens.collect();
        let imm_field = Layout::of(op.format()).imm.unwrap_or(Field::LOW);

        let instr = match op.format() {
            Format::R => {
                expect_operands(op, &operands, 3, line)?;
                Instruction::R {
                    op,
                    rd: parse_register(operands[0], line)?,
                    rs1: parse_register(operands[1], line)?,
                    rs2: parse_register(operands[2], line)?,
                }
            }
            Format::I if op == Opcode::Lw => {
                let (rd, rs1, imm) = parse_memory_form(op, &operands, imm_field, line)?;
                Instruction::I { op, rd, rs1, imm }
            }
            Format::I => {
                expect_operands(op, &operands, 3, line)?;
                Instruction::I {
                    op,
                    rd: parse_register(operands[0], line)?,
                    rs1: parse_register(operands[1], line)?,
                    imm: parse_immediate(operands[2], imm_field, line)? as u8,
                }
            }
            Format::S => {
                let (rs2, rs1, offset) = parse_memory_form(op, &operands, imm_field, line)?;
                Instruction::S { op, rs2, rs1, offset }
            }
            Format::B => {
                expect_operands(op, &operands, 3, line)?;
                Instruction::B {
                    op,
                    rs1: parse_register(operands[0], line)?,
                    rs2: parse_register(operands[1], line)?,
                    offset: self.resolve_target(operands[2], imm_field, src)? as i8,
                }
            }
            Format::J => {
                expect_operands(op, &operands, 2, line)?;
                Instruction::J {
                    op,
                    rd: parse_register(operands[0], line)?,
                    offset: self.resolve_target(operands[1], imm_field, src)? as i8,
                }
            }
            Format::Special => {
                expect_operands(op, &operands, 0, line)?;
                Instruction::Special { op }
            }
        };
        Ok(instr)
    }

    /// A literal offset, or `label - current address` truncated to the field.
    fn resolve_target(&self, text: &str, field: Field, src: &SourceLine<'_>) -> Result<i32, AssemblerError> {
        if starts_numeric(text) {
            return parse_immediate(text, field, src.line);
        }
        let Some(&dest) = self.labels.get(text) else {
            return Err(AssemblerError::UndefinedLabel { line: src.line, label: text.to_string() });
        };

        let displacement = i32::from(dest) - i32::from(src.address);
        if !field.fits(displacement) {
            let (min, max) = field.range();
            warn!(line = src.line, label = text, displacement, min, max, "branch target out of reach, offset truncated");
        }
        Ok(field.extract(field.pack(displacement)))
    }
}

fn is_valid_label(label: &str) -> bool {
    let mut chars = label.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '.' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
        }
        _ => false,
    }
}

fn expect_operands(op: Opcode, operands: &[&str], expected: usize, line: usize) -> Result<(), AssemblerError> {
    if operands.len() == expected {
        Ok(())
    } else {
        Err(AssemblerError::OperandCount {
            line,
            mnemonic: op.mnemonic(),
            expected,
            found: operands.len(),
        })
    }
}

fn parse_register(name: &str, line: usize) -> Result<u8, AssemblerError> {
    RegisterFile::index_of(name)
        .map(|index| index as u8)
        .ok_or_else(|| AssemblerError::InvalidRegister { line, name: name.to_string() })
}

fn starts_numeric(text: &str) -> bool {
    text.trim_start_matches('-').starts_with(|c: char| c.is_ascii_digit())
}

/// Decimal or `0x` hex, optionally negative.
fn parse_number(text: &str) -> Option<i32> {
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let value = match digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        Some(hex) if !hex.is_empty() && hex.bytes().all(|b| b.is_ascii_hexdigit()) => {
            i32::from_str_radix(hex, 16).ok()?
        }
        Some(_) => return None,
        None if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) => {
            digits.parse::<i32>().ok()?
        }
        None => return None,
    };
    Some(if negative { -value } else { value })
}

fn parse_immediate(text: &str, field: Field, line: usize) -> Result<i32, AssemblerError> {
    let value = parse_number(text)
        .ok_or_else(|| AssemblerError::InvalidNumber { line, text: text.to_string() })?;
    if !field.fits(value) {
        let (min, max) = field.range();
        return Err(AssemblerError::ValueOutOfRange { line, value, min, max });
    }
    Ok(value)
}

/// `op reg, offset(base)`. Returns `(reg, base, offset)`.
fn parse_memory_form(
    op: Opcode,
    operands: &[&str],
    field: Field,
    line: usize,
) -> Result<(u8, u8, u8), AssemblerError> {
    if operands.len() < 2 {
        return Err(AssemblerError::OperandCount {
            line,
            mnemonic: op.mnemonic(),
            expected: 2,
            found: operands.len(),
        });
    }
    let reg = parse_register(operands[0], line)?;
    let operand = operands[1..].concat();

    let Some((offset, base)) = operand.strip_suffix(')').and_then(|t| t.split_once('(')) else {
        return Err(AssemblerError::InvalidMemoryOperand { line, operand });
    };
    let offset = if offset.is_empty() { 0 } else { parse_immediate(offset, field, line)? };
    let base = parse_register(base, line)?;
    Ok((reg, base, offset as u8))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(source: &str) -> Vec<u16> {
        let asm = assemble(source);
        assert!(asm.is_ok(), "errors: {:?}", asm.errors);
        asm.words
    }

    #[test]
    fn test_assemble_simple() {
        let source = r#"
            # Simple test program
            addi x1, x0, 10
            addi x2, x0, 5
            add  x3, x1, x2
            halt
        "#;
        assert_eq!(words(source), vec![0x510A, 0x5205, 0x0312, 0xF000]);
    }

    #[test]
    fn test_assemble_with_labels() {
        let source = r#"
                    addi t0, zero, 1
                    addi a0, zero, 5
            loop:   sub  a0, a0, t0
                    bne  a0, zero, loop
                    halt
        "#;
        let asm = assemble(source);
        assert!(asm.is_ok());
        assert_eq!(asm.label("loop"), Some(2));
        assert_eq!(asm.words[3], 0xBA0F);
    }

    #[test]
    fn test_forward_label_and_blank_lines() {
        let source = "beq x0, x0, end\n\n# only a comment\nnop\nend:\n  halt\n";
        let asm = assemble(source);
        assert_eq!(asm.words, vec![0xA002, 0xE000, 0xF000]);
        assert_eq!(asm.label("end"), Some(2));
        assert_eq!(asm.listing[2].line, 6);
    }

    #[test]
    fn test_jal_to_label() {
        let source = "start: nop\njal ra, start\n";
        assert_eq!(words(source), vec![0xE000, 0xC1FF]);
    }

    #[test]
    fn test_memory_operands() {
        assert_eq!(words("sw x1, 4(sp)"), vec![0x9124]);
        assert_eq!(words("lw x2, (x1)"), vec![0x8210]);
        assert_eq!(words("lw x2, 0x3 (x1)"), vec![0x8213]);
    }

    #[test]
    fn test_case_and_hex() {
        assert_eq!(words("ADDI X1, ZERO, 0xF\nHalt"), vec![0x510F, 0xF000]);
    }

    #[test]
    fn test_bad_line_is_skipped() {
        let source = "addi x1, x0, 1\nmul x1, x2, x3\nhalt\n";
        let asm = assemble(source);
        assert_eq!(asm.words, vec![0x5101, 0xF000]);
        assert_eq!(
            asm.errors,
            vec![AssemblerError::UnknownMnemonic { line: 2, mnemonic: "mul".into() }]
        );
    }

    #[test]
    fn test_operand_errors() {
        let asm = assemble("add x1, x2\naddi x1, x16, 0\naddi x1, x0, 16\naddi x1, x0, -1\nsw x1, x2\nnop x1");
        let lines: Vec<usize> = asm.errors.iter().map(AssemblerError::line).collect();
        assert_eq!(lines, vec![1, 2, 3, 4, 5, 6]);
        assert!(asm.words.is_empty());
        assert!(matches!(asm.errors[0], AssemblerError::OperandCount { expected: 3, found: 2, .. }));
        assert!(matches!(asm.errors[2], AssemblerError::ValueOutOfRange { value: 16, min: 0, max: 15, .. }));
        assert!(matches!(asm.errors[4], AssemblerError::InvalidMemoryOperand { .. }));
    }

    #[test]
    fn test_label_errors() {
        let asm = assemble("a: nop\na: nop\n9bad: nop\nbeq x0, x0, nowhere\n");
        assert_eq!(asm.label("a"), Some(0));
        assert!(matches!(asm.errors[0], AssemblerError::DuplicateLabel { line: 2, first: 1, .. }));
        assert!(matches!(asm.errors[1], AssemblerError::InvalidLabel { line: 3, .. }));
        assert!(matches!(asm.errors[2], AssemblerError::UndefinedLabel { line: 4, .. }));
        assert_eq!(asm.words.len(), 3);
    }

    #[test]
    fn test_labels_are_case_sensitive() {
        let asm = assemble("Loop: nop\nbne x1, x0, loop\n");
        assert!(matches!(asm.errors[..], [AssemblerError::UndefinedLabel { .. }]));
    }

    #[test]
    fn test_far_label_is_truncated() {
        let mut source = String::from("beq x0, x0, far\n");
        for _ in 0..8 {
            source.push_str("nop\n");
        }
        source.push_str("far: halt\n");
        let asm = assemble(&source);
        assert!(asm.is_ok());
        assert_eq!(asm.words[0], 0xA009);
    }

    #[test]
    fn test_literal_branch_offset_range() {
        assert_eq!(words("beq x1, x2, -8"), vec![0xA128]);
        let asm = assemble("beq x1, x2, 8");
        assert!(matches!(asm.errors[..], [AssemblerError::ValueOutOfRange { min: -8, max: 7, .. }]));
    }

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number("42"), Some(42));
        assert_eq!(parse_number("-0x10"), Some(-16));
        assert_eq!(parse_number("0x"), None);
        assert_eq!(parse_number("+5"), None);
        assert_eq!(parse_number("0x-5"), None);
    }

    #[test]
    fn test_into_result() {
        assert_eq!(assemble("nop").into_result(), Ok(vec![0xE000]));
        assert!(assemble("bogus").into_result().is_err());
    }
}
