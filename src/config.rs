//! Simulator configuration.
//!
//! Every field has a default, so a JSON file only needs to list the
//! values it changes:
//!
//! ```json
//! { "dmem_size": 64, "policy": "strict" }
//! ```

use std::path::Path;
use serde::{Serialize, Deserialize};

use crate::cpu::diagnostics::ErrorPolicy;
use crate::error::SimError;

/// Default instruction memory size, in words.
pub const DEFAULT_IMEM_SIZE: usize = 1024;
/// Default data memory size, in words.
pub const DEFAULT_DMEM_SIZE: usize = 1024;
/// Default logical base address of data memory.
pub const DEFAULT_DMEM_BASE: u16 = 0x1000;

/// Upper bound on the execution history ring.
pub const MAX_HISTORY_CAPACITY: usize = 20;
/// Upper bound on the diagnostic log.
pub const MAX_ERROR_LOG_CAPACITY: usize = 100;

/// Size of the 16-bit address space.
const ADDRESS_SPACE: usize = 0x1_0000;

/// Parameters of one simulation session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Instruction memory size in words.
    pub imem_size: usize,
    /// Data memory size in words.
    pub dmem_size: usize,
    /// Logical address of the first data memory word.
    pub dmem_base: u16,
    /// How faults are surfaced.
    pub policy: ErrorPolicy,
    /// Entries kept in the execution history ring.
    pub history_capacity: usize,
    /// Entries kept in the diagnostic log.
    pub error_log_capacity: usize,
    /// Watchdog budget used when the caller does not supply one.
    pub max_cycles: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            imem_size: DEFAULT_IMEM_SIZE,
            dmem_size: DEFAULT_DMEM_SIZE,
            dmem_base: DEFAULT_DMEM_BASE,
            policy: ErrorPolicy::Graceful,
            history_capacity: 20,
            error_log_capacity: 10,
            max_cycles: 1000,
        }
    }
}

impl SimConfig {
    /// Parse a configuration from JSON text.
    pub fn from_json_str(text: &str) -> Result<Self, SimError> {
        let config: Self = serde_json::from_str(text)
            .map_err(|e| SimError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a JSON file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, SimError> {
        let text = std::fs::read_to_string(path.as_ref())
            .map_err(|e| SimError::InvalidConfig(format!("{}: {}", path.as_ref().display(), e)))?;
        Self::from_json_str(&text)
    }

    /// Builder-style memory sizing.
    pub fn with_memory(mut self, imem_size: usize, dmem_size: usize) -> Self {
        self.imem_size = imem_size;
        self.dmem_size = dmem_size;
        self
    }

    /// Builder-style policy selection.
    pub fn with_policy(mut self, policy: ErrorPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Check that the memories fit the 16-bit address space and the
    /// diagnostic buffers stay within their bounds.
    pub fn validate(&self) -> Result<(), SimError> {
        if self.imem_size == 0 || self.imem_size > ADDRESS_SPACE {
            return Err(SimError::InvalidConfig(format!(
                "instruction memory size {} must be between 1 and {}",
                self.imem_size, ADDRESS_SPACE
            )));
        }
        if self.dmem_size == 0 {
            return Err(SimError::InvalidConfig("data memory size must be non-zero".into()));
        }
        if usize::from(self.dmem_base) + self.dmem_size > ADDRESS_SPACE {
            return Err(SimError::InvalidConfig(format!(
                "data memory {:#06x}+{} does not fit the 16-bit address space",
                self.dmem_base, self.dmem_size
            )));
        }
        if self.history_capacity > MAX_HISTORY_CAPACITY {
            return Err(SimError::InvalidConfig(format!(
                "history capacity {} exceeds {}",
                self.history_capacity, MAX_HISTORY_CAPACITY
            )));
        }
        if self.error_log_capacity > MAX_ERROR_LOG_CAPACITY {
            return Err(SimError::InvalidConfig(format!(
                "error log capacity {} exceeds {}",
                self.error_log_capacity, MAX_ERROR_LOG_CAPACITY
            )));
        }
        Ok(())
    }
}
