//! Error Catcher - captures engine error diagnostics for a long-running host
//!
//! Filters the engine's diagnostic stream down to real errors, echoes them to
//! the operator console, and batches them into one log file per round on a
//! background writer.

pub mod config;
pub mod controller;
pub mod error;
pub mod filter;
pub mod logging;
pub mod record;
pub mod session;
pub mod source;

pub use controller::{CaptureContext, ErrorCatcher};
pub use record::{ErrorRecord, Severity};
