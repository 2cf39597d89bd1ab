mod guard;
mod machine;
mod phase;
mod phases;
mod terminal;
mod types;
mod waiter;

#[cfg(test)]
mod tests;

pub use guard::SingleFlightGuard;
pub use machine::{SequenceReport, ShutdownSequencer, ShutdownSequencerBuilder};
pub use phase::{poll_until_off, Completion, Phase, PollPolicy};
pub use terminal::TerminalAction;
pub use types::{PhaseOutcome, SequenceState, ShutdownRequest, Stage, SubsystemStatus};
pub use waiter::{wait_for, CompletionHandle, CompletionSignal, WaitResult};
