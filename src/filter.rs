//! Severity filter
//!
//! Decides whether an engine diagnostic is a real error worth capturing.

use crate::record::Severity;

/// Traces from this subsystem are known noise
const NOISY_TRACE_MARKER: &str = "Clutter";

/// Benign engine warning that is reported at error level
const BENIGN_MESSAGE_MARKER: &str = "A scripted object";

/// Check whether a diagnostic should be captured
///
/// Rejects anything that is not an `Error` or `Exception`, then drops known
/// noise by trace and message content.
pub fn should_capture(message: &str, trace: &str, severity: Severity) -> bool {
    if !severity.is_error() {
        return false;
    }

    if trace.contains(NOISY_TRACE_MARKER) {
        return false;
    }

    if message.contains(BENIGN_MESSAGE_MARKER) {
        return false;
    }

    true
}
