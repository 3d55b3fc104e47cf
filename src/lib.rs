//! # RV16
//!
//! An instruction-set simulator for a 16-bit, 16-register CPU loosely
//! modelled on RISC-V, plus a two-pass assembler for it.
//!
//! ```
//! use rv16::{assemble, Cpu};
//!
//! let words = assemble("addi x1, x0, 10\naddi x2, x0, 5\nadd x3, x1, x2\nhalt")
//!     .into_result()
//!     .unwrap();
//! let mut cpu = Cpu::new();
//! cpu.load_program(&words).unwrap();
//! assert_eq!(cpu.run(100), Ok(true));
//! assert_eq!(cpu.register(3), 15);
//! ```

pub mod asm;
pub mod config;
pub mod cpu;
pub mod error;
pub mod isa;

// Re-export commonly used types
pub use asm::{assemble, disassemble, disassemble_word, Assembly, AssemblerError};
pub use config::SimConfig;
pub use cpu::{decode, encode, Cpu, CpuSnapshot, CpuState, ErrorPolicy, Instruction};
pub use error::{ErrorKind, SimError};
pub use isa::{Format, Opcode};
