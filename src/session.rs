//! Round session tracking
//!
//! The host announces the start of every round. The first announcement after
//! load only activates capture; every later one asks the writer to rotate to a
//! new file. State is a single atomic so the round signal and the writer loop
//! never see a torn value.

use std::sync::atomic::{AtomicU8, Ordering};

/// Round lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundState {
    /// No round has started since load
    NoSession,
    /// A round is running and the current file belongs to it
    SessionActive,
    /// A new round started; the writer has not closed the old file yet
    RotationPending,
}

impl RoundState {
    fn as_u8(self) -> u8 {
        match self {
            RoundState::NoSession => 0,
            RoundState::SessionActive => 1,
            RoundState::RotationPending => 2,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => RoundState::SessionActive,
            2 => RoundState::RotationPending,
            _ => RoundState::NoSession,
        }
    }
}

/// Outcome of a round-start signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundTransition {
    /// First round since load; capture becomes active
    Activated,
    /// A later round; the writer should rotate on its next cycle
    RotationRequested,
}

/// Shared round state machine
#[derive(Debug)]
pub struct RoundTracker {
    state: AtomicU8,
}

impl RoundTracker {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(RoundState::NoSession.as_u8()),
        }
    }

    /// Current state
    pub fn state(&self) -> RoundState {
        RoundState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Whether a round has started since load
    pub fn is_active(&self) -> bool {
        self.state() != RoundState::NoSession
    }

    /// Handle a round-start signal
    pub fn begin_round(&self) -> RoundTransition {
        let previous = self
            .state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                let next = match RoundState::from_u8(current) {
                    RoundState::NoSession => RoundState::SessionActive,
                    _ => RoundState::RotationPending,
                };
                Some(next.as_u8())
            })
            .unwrap_or_else(|current| current);

        if RoundState::from_u8(previous) == RoundState::NoSession {
            RoundTransition::Activated
        } else {
            RoundTransition::RotationRequested
        }
    }

    /// Consume a pending rotation
    ///
    /// Returns true if a rotation was pending. Only the writer calls this.
    pub fn take_rotation(&self) -> bool {
        self.state
            .compare_exchange(
                RoundState::RotationPending.as_u8(),
                RoundState::SessionActive.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Return to the unloaded state
    pub fn reset(&self) {
        self.state
            .store(RoundState::NoSession.as_u8(), Ordering::Release);
    }
}

impl Default for RoundTracker {
    fn default() -> Self {
        Self::new()
    }
}
