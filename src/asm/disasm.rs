//! Disassembler for RV16 programs.
//!
//! Turns machine words back into the assembler's own syntax, so the
//! output of [`disassemble`] (minus the address columns) re-assembles to
//! the same words.

use crate::asm::assembler::Assembly;
use crate::cpu::decode::decode;

/// Disassemble a single word to text.
pub fn disassemble_word(word: u16) -> String {
    decode(word).to_string()
}

/// Disassemble a program, one line per word.
pub fn disassemble(words: &[u16]) -> String {
    let mut output = String::new();
    output.push_str("# RV16 disassembly\n");
    output.push_str("# -----------------\n\n");

    for (addr, &word) in words.iter().enumerate() {
        output.push_str(&format!("{:04X}: {:04X}  {}\n", addr, word, disassemble_word(word)));
    }

    output
}

/// Render an assembly listing: address, word, source line.
pub fn listing(assembly: &Assembly) -> String {
    let mut output = String::new();
    for entry in &assembly.listing {
        output.push_str(&entry.to_string());
        output.push('\n');
    }
    if !assembly.labels.is_empty() {
        let mut labels: Vec<_> = assembly.labels.iter().collect();
        labels.sort_by_key(|&(name, addr)| (*addr, name.as_str()));
        output.push_str("\n# labels\n");
        for (name, addr) in labels {
            output.push_str(&format!("{:04X}: {}\n", addr, name));
        }
    }
    output
}
