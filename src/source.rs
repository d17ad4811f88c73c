//! Host-facing seams
//!
//! The engine pushes diagnostics through a [`DiagnosticSource`] and the
//! operator sees echoed errors through a [`ConsoleSink`]. [`EventHub`] is an
//! in-process source a host can feed directly.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use crate::record::Severity;

/// Callback invoked for every engine diagnostic
///
/// May be called concurrently from any thread. Must return quickly and never
/// panic.
pub type DiagnosticHandler = Arc<dyn Fn(&str, &str, Severity) + Send + Sync>;

/// Identifies one registered handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Source of engine diagnostics
pub trait DiagnosticSource: Send + Sync {
    /// Register a handler
    fn subscribe(&self, handler: DiagnosticHandler) -> SubscriptionId;

    /// Remove a handler; unknown or already-removed ids are ignored
    fn unsubscribe(&self, id: SubscriptionId);
}

/// Operator console
pub trait ConsoleSink: Send + Sync {
    /// Print one line (may contain embedded newlines)
    fn print_line(&self, line: &str);
}

/// In-process diagnostic source
#[derive(Default)]
pub struct EventHub {
    handlers: RwLock<Vec<(SubscriptionId, DiagnosticHandler)>>,
    next_id: AtomicU64,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver a diagnostic to every subscriber
    pub fn emit(&self, message: &str, trace: &str, severity: Severity) {
        // Call outside the lock so handlers may (un)subscribe
        let handlers: Vec<DiagnosticHandler> = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, handler)| Arc::clone(handler))
            .collect();

        for handler in handlers {
            handler(message, trace, severity);
        }
    }

    /// Number of registered handlers
    pub fn subscriber_count(&self) -> usize {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl DiagnosticSource for EventHub {
    fn subscribe(&self, handler: DiagnosticHandler) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, handler));
        id
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(existing, _)| *existing != id);
    }
}

/// Console sink that reports through `tracing` at error level
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingConsole;

impl ConsoleSink for TracingConsole {
    fn print_line(&self, line: &str) {
        tracing::error!(target: "error_catcher::console", "{}", line);
    }
}
