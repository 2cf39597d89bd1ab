pub mod adapters;
pub mod app;
pub mod config;
pub mod error;
pub mod events;
pub mod platform;
pub mod recovery;
pub mod sequencer;

pub use adapters::Collaborators;
pub use app::{PowerdownApp, Trigger};
pub use config::PowerdownConfig;
pub use error::{PowerdownError, Result};
pub use events::{EventBus, SequenceEvent};
pub use recovery::{resume_pending, ShutdownMarker};
pub use sequencer::{
    PhaseOutcome, SequenceReport, SequenceState, ShutdownRequest, ShutdownSequencer,
    SingleFlightGuard, Stage, TerminalAction,
};
