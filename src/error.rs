//! Error types for the capture pipeline
//!
//! None of these ever reach the host: the controller and writer report them
//! through `tracing` and carry on.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to create log directory {}: {source}", path.display())]
    CreateDir { path: PathBuf, source: io::Error },

    #[error("failed to open error log {}: {source}", path.display())]
    OpenLog { path: PathBuf, source: io::Error },

    #[error("failed to write error log {}: {source}", path.display())]
    Write { path: PathBuf, source: io::Error },

    #[error("no tokio runtime available to run the log writer")]
    NoRuntime,
}

impl CaptureError {
    /// The underlying I/O error, if any
    pub fn io_error(&self) -> Option<&io::Error> {
        match self {
            CaptureError::CreateDir { source, .. }
            | CaptureError::OpenLog { source, .. }
            | CaptureError::Write { source, .. } => Some(source),
            CaptureError::NoRuntime => None,
        }
    }

    /// Operator-facing description with the I/O cause categorized
    pub fn friendly_message(&self) -> String {
        match self {
            CaptureError::CreateDir { path, source } => friendly_io_error_message(
                source,
                &format!("Cannot create log directory {}", path.display()),
            ),
            CaptureError::OpenLog { path, source } => friendly_io_error_message(
                source,
                &format!("Cannot open error log {}", path.display()),
            ),
            CaptureError::Write { path, source } => friendly_io_error_message(
                source,
                &format!("Cannot write error log {}", path.display()),
            ),
            CaptureError::NoRuntime => self.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CaptureError>;

/// Categories of disk errors for operator-facing messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiskErrorKind {
    /// Disk is full or quota exceeded
    DiskFull,
    /// Permission denied (read or write)
    PermissionDenied,
    /// File or directory not found
    NotFound,
    /// Other IO error
    Other,
}

impl DiskErrorKind {
    /// Get a short message for this error kind
    pub fn user_message(&self) -> &'static str {
        match self {
            DiskErrorKind::DiskFull => "disk full, errors from this cycle are dropped",
            DiskErrorKind::PermissionDenied => "permission denied",
            DiskErrorKind::NotFound => "file or directory not found",
            DiskErrorKind::Other => "I/O error",
        }
    }
}

/// Categorize an IO error
pub fn categorize_io_error(e: &io::Error) -> DiskErrorKind {
    use std::io::ErrorKind;

    match e.kind() {
        ErrorKind::StorageFull => DiskErrorKind::DiskFull,
        // On some systems, disk full might appear as WriteZero
        ErrorKind::WriteZero => DiskErrorKind::DiskFull,

        ErrorKind::PermissionDenied => DiskErrorKind::PermissionDenied,

        ErrorKind::NotFound => DiskErrorKind::NotFound,

        _ => {
            #[cfg(unix)]
            {
                if let Some(os_error) = e.raw_os_error() {
                    // ENOSPC = 28, EDQUOT = 122 on Linux / 69 on macOS
                    if os_error == 28 || os_error == 122 || os_error == 69 {
                        return DiskErrorKind::DiskFull;
                    }
                    // EACCES
                    if os_error == 13 {
                        return DiskErrorKind::PermissionDenied;
                    }
                }
            }
            DiskErrorKind::Other
        }
    }
}

/// Create an operator-facing message from an IO error
pub fn friendly_io_error_message(e: &io::Error, context: &str) -> String {
    match categorize_io_error(e) {
        DiskErrorKind::Other => format!("{}: {}", context, e),
        kind => format!("{}: {}", context, kind.user_message()),
    }
}
