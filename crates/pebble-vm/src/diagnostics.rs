//! Program-level diagnostics.
//!
//! These are reports about the running Pebble program, collected on the VM
//! and handed back with the execution result. Developer tracing goes
//! through `tracing` and is kept separate.

use std::fmt;

use serde::Serialize;

/// How a reported problem affects execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Severity {
    /// Execution continues with `Nothing` in place of the failed result
    Recoverable,
    /// Execution stopped
    Fatal,
}

/// A program-level error report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    /// Severity of the report
    pub severity: Severity,
    /// Source line of the statement being executed
    pub line: usize,
    /// Description
    pub message: String,
}

impl Diagnostic {
    /// A recoverable report.
    pub fn recoverable(line: usize, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Recoverable,
            line,
            message: message.into(),
        }
    }

    /// A fatal report.
    pub fn fatal(line: usize, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Fatal,
            line,
            message: message.into(),
        }
    }

    /// Returns true for fatal reports.
    pub fn is_fatal(&self) -> bool {
        self.severity == Severity::Fatal
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}
