//! Pending error buffer
//!
//! Thread-safe queue of captured records waiting for the writer. Appends come
//! from whatever thread the engine delivers diagnostics on; the writer drains
//! the whole queue once per cycle.

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::record::ErrorRecord;

#[derive(Debug, Default)]
struct BufferState {
    records: Vec<ErrorRecord>,
    closed: bool,
}

/// Unbounded, ordered buffer shared between the event handler and the writer
///
/// Closing happens under the same lock as appends, so once [`close`] returns
/// every record is either already buffered or will be refused.
///
/// [`close`]: PendingBuffer::close
#[derive(Debug, Default)]
pub struct PendingBuffer {
    state: Mutex<BufferState>,
}

impl PendingBuffer {
    /// Create an empty, open buffer
    pub fn new() -> Self {
        Self::default()
    }

    // A panic while holding the lock cannot leave the Vec half-written, so a
    // poisoned lock is still safe to use.
    fn lock(&self) -> MutexGuard<'_, BufferState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a record to the end of the buffer
    ///
    /// Returns false, dropping the record, if the buffer is closed.
    pub fn append(&self, record: ErrorRecord) -> bool {
        let mut state = self.lock();
        if state.closed {
            return false;
        }
        state.records.push(record);
        true
    }

    /// Remove and return everything buffered so far, in insertion order
    pub fn drain_all(&self) -> Vec<ErrorRecord> {
        std::mem::take(&mut self.lock().records)
    }

    /// Refuse further appends; buffered records stay drainable
    pub fn close(&self) {
        self.lock().closed = true;
    }

    /// Accept appends again
    pub fn reopen(&self) {
        self.lock().closed = false;
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Get the number of pending records
    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    /// Check if the buffer is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
