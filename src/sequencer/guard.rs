use super::types::SequenceState;
use std::sync::atomic::{AtomicU8, Ordering};
use tracing::debug;

/// Ensures at most one shutdown sequence ever runs.
///
/// The guard is created once, shared by every flow that may ask for a
/// shutdown, and never reset.
#[derive(Debug)]
pub struct SingleFlightGuard {
    state: AtomicU8,
}

impl SingleFlightGuard {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(SequenceState::NotStarted as u8),
        }
    }

    /// Returns `true` for the first caller only; that caller owns the sequence.
    pub fn try_start(&self) -> bool {
        let won = self
            .state
            .compare_exchange(
                SequenceState::NotStarted as u8,
                SequenceState::Running as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();

        if !won {
            debug!(
                "Shutdown sequence already {:?}, ignoring request",
                self.state()
            );
        }
        won
    }

    /// Marks the sequence as having reached its terminal action
    pub fn mark_completed(&self) {
        self.state
            .store(SequenceState::Completed as u8, Ordering::Release);
    }

    pub fn state(&self) -> SequenceState {
        SequenceState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_started(&self) -> bool {
        self.state() != SequenceState::NotStarted
    }
}

impl Default for SingleFlightGuard {
    fn default() -> Self {
        Self::new()
    }
}
