//! Fault handling policy and the bounded diagnostic log.
//!
//! Every fault the CPU sees is recorded here. What happens next depends
//! on the [`ErrorPolicy`]: a graceful session substitutes a safe value and
//! keeps going, a strict one hands the error back to the caller.

use std::collections::VecDeque;
use std::fmt::Write as _;
use serde::{Serialize, Deserialize};
use tracing::warn;

use crate::error::{ErrorKind, SimError};

/// How faults are surfaced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorPolicy {
    /// Log and continue with a safe substitute.
    #[default]
    Graceful,
    /// Log and return the error from `step`/`run`.
    Strict,
}

/// One logged fault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    /// Sequence number, counting from 1 over the handler's lifetime.
    pub seq: u64,
    pub kind: ErrorKind,
    pub message: String,
    pub pc: Option<u16>,
    pub word: Option<u16>,
}

/// Fault counter plus the most recent diagnostics.
#[derive(Debug, Clone)]
pub struct ErrorHandler {
    policy: ErrorPolicy,
    capacity: usize,
    total: u64,
    log: VecDeque<Diagnostic>,
}

impl ErrorHandler {
    pub fn new(policy: ErrorPolicy, capacity: usize) -> Self {
        Self { policy, capacity, total: 0, log: VecDeque::new() }
    }

    pub fn policy(&self) -> ErrorPolicy {
        self.policy
    }

    pub fn set_policy(&mut self, policy: ErrorPolicy) {
        self.policy = policy;
    }

    pub fn is_strict(&self) -> bool {
        self.policy == ErrorPolicy::Strict
    }

    /// Log `err` without deciding what to do about it.
    pub fn record(&mut self, err: &SimError) {
        self.total += 1;
        if self.capacity == 0 {
            return;
        }
        if self.log.len() == self.capacity {
            self.log.pop_front();
        }
        self.log.push_back(Diagnostic {
            seq: self.total,
            kind: err.kind(),
            message: err.to_string(),
            pc: err.pc(),
            word: err.word(),
        });
    }

    /// Log `err`, then either propagate it (strict) or return `fallback`.
    pub fn handle<T>(&mut self, err: SimError, fallback: T) -> Result<T, SimError> {
        self.record(&err);
        match self.policy {
            ErrorPolicy::Strict => Err(err),
            ErrorPolicy::Graceful => {
                warn!(kind = %err.kind(), "{err}; continuing");
                Ok(fallback)
            }
        }
    }

    /// Total faults seen, including ones evicted from the log.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Retained diagnostics, oldest first.
    pub fn log(&self) -> impl Iterator<Item = &Diagnostic> {
        self.log.iter()
    }

    pub fn last(&self) -> Option<&Diagnostic> {
        self.log.back()
    }

    /// Human-readable summary with the last five diagnostics.
    pub fn summary(&self) -> String {
        if self.total == 0 {
            return "No errors".to_string();
        }
        let mut out = format!("{} error(s)", self.total);
        let skip = self.log.len().saturating_sub(5);
        for diag in self.log.iter().skip(skip) {
            let _ = write!(out, "\n  #{} [{}] {}", diag.seq, diag.kind, diag.message);
        }
        out
    }

    pub fn clear(&mut self) {
        self.total = 0;
        self.log.clear();
    }
}

impl Default for ErrorHandler {
    fn default() -> Self {
        Self::new(ErrorPolicy::Graceful, 10)
    }
}
