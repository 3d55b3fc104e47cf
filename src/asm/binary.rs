//! Program image formats.
//!
//! - Binary: 16-bit words, little-endian, 2 bytes per word, no header
//! - Hex dump: one `INDEX: WORD` line per word, the word as 16 binary digits
//!
//! Lines starting with `#` and blank lines are ignored when reading a dump.

use std::path::Path;
use thiserror::Error;

/// Serialize words as little-endian bytes.
pub fn to_bytes(words: &[u16]) -> Vec<u8> {
    words.iter().flat_map(|w| w.to_le_bytes()).collect()
}

/// Parse little-endian bytes into words.
pub fn from_bytes(bytes: &[u8]) -> Result<Vec<u16>, BinaryError> {
    if bytes.len() % 2 != 0 {
        return Err(BinaryError::OddLength(bytes.len()));
    }
    Ok(bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect())
}

/// Save a program image to disk.
pub fn save_binary<P: AsRef<Path>>(path: P, words: &[u16]) -> Result<(), BinaryError> {
    std::fs::write(path.as_ref(), to_bytes(words))
        .map_err(|e| BinaryError::IoError(format!("{}: {}", path.as_ref().display(), e)))
}

/// Load a program image from disk.
pub fn load_binary<P: AsRef<Path>>(path: P) -> Result<Vec<u16>, BinaryError> {
    let bytes = std::fs::read(path.as_ref())
        .map_err(|e| BinaryError::IoError(format!("{}: {}", path.as_ref().display(), e)))?;
    from_bytes(&bytes)
}

/// Render the debug dump, e.g. `0000: 0101000100001010`.
pub fn hex_dump(words: &[u16]) -> String {
    words
        .iter()
        .enumerate()
        .map(|(i, w)| format!("{i:04}: {w:016b}\n"))
        .collect()
}

/// Parse a dump produced by [`hex_dump`]. Indices must run 0, 1, 2, ...
pub fn parse_hex_dump(text: &str) -> Result<Vec<u16>, BinaryError> {
    let mut words = Vec::new();

    for (line_num, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let parse_error = |message: String| BinaryError::ParseError { line: line_num + 1, message };

        let (index, bits) = trimmed
            .split_once(':')
            .ok_or_else(|| parse_error("expected INDEX: WORD".into()))?;
        let index: usize = index
            .trim()
            .parse()
            .map_err(|_| parse_error(format!("bad index {:?}", index.trim())))?;
        if index != words.len() {
            return Err(parse_error(format!("expected index {}, found {}", words.len(), index)));
        }

        let bits = bits.trim();
        if bits.len() != 16 || !bits.bytes().all(|b| b == b'0' || b == b'1') {
            return Err(parse_error(format!("expected 16 binary digits, found {:?}", bits)));
        }
        let word = u16::from_str_radix(bits, 2).map_err(|e| parse_error(e.to_string()))?;
        words.push(word);
    }

    Ok(words)
}

/// Errors that can occur while reading or writing program images.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BinaryError {
    #[error("I/O error: {0}")]
    IoError(String),

    #[error("binary image has odd length of {0} bytes")]
    OddLength(usize),

    #[error("parse error on line {line}: {message}")]
    ParseError { line: usize, message: String },
}
