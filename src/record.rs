//! Captured error records
//!
//! An [`ErrorRecord`] is one engine diagnostic that passed the severity filter
//! and is waiting to be written to the round's log file.

use std::fmt;

/// Kind of diagnostic reported by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    Error,
    Assert,
    Warning,
    Log,
    Exception,
}

impl Severity {
    /// Get the display name for this kind
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Error => "Error",
            Severity::Assert => "Assert",
            Severity::Warning => "Warning",
            Severity::Log => "Log",
            Severity::Exception => "Exception",
        }
    }

    /// Check if this kind is one the catcher ever records
    pub fn is_error(&self) -> bool {
        matches!(self, Severity::Error | Severity::Exception)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for Severity {
    fn from(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "error" => Severity::Error,
            "assert" => Severity::Assert,
            "warning" | "warn" => Severity::Warning,
            "exception" => Severity::Exception,
            _ => Severity::Log,
        }
    }
}

/// A single captured error occurrence
///
/// Records carry no timestamp of their own; the writer stamps each block with
/// the time it reaches the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorRecord {
    /// Human-readable error condition
    pub message: String,
    /// Stack or context trace, possibly empty
    pub trace: String,
    /// Kind reported by the engine
    pub severity: Severity,
}

impl ErrorRecord {
    /// Create a new record
    pub fn new(message: impl Into<String>, trace: impl Into<String>, severity: Severity) -> Self {
        Self {
            message: message.into(),
            trace: trace.into(),
            severity,
        }
    }

    /// Header line shared by the console echo and the file block
    pub fn header(&self) -> String {
        format!("Catched Unity Message of type {}:", self.severity)
    }
}
