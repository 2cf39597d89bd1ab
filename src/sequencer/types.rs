use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of the one shutdown sequence a process may run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum SequenceState {
    NotStarted = 0,
    Running = 1,
    Completed = 2,
}

impl SequenceState {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            0 => SequenceState::NotStarted,
            1 => SequenceState::Running,
            _ => SequenceState::Completed,
        }
    }
}

/// What the terminal action should do once every phase has run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShutdownRequest {
    pub is_reboot: bool,
    pub reason: Option<String>,
}

impl ShutdownRequest {
    pub fn shutdown() -> Self {
        Self {
            is_reboot: false,
            reason: None,
        }
    }

    pub fn reboot<S: Into<String>>(reason: Option<S>) -> Self {
        Self {
            is_reboot: true,
            reason: reason.map(Into::into),
        }
    }

    pub fn action(&self) -> &'static str {
        if self.is_reboot {
            "reboot"
        } else {
            "shutdown"
        }
    }
}

/// Sequencer stages, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    Idle,
    BroadcastingIntent,
    StoppingSupervisor,
    DisablingRadios,
    WaitingFsSync,
    ConfirmingRadiosOff,
    ShuttingDownStorage,
    TerminalAction,
}

impl Stage {
    /// Every stage a sequence passes through after leaving `Idle`
    pub const SEQUENCE: [Stage; 7] = [
        Stage::BroadcastingIntent,
        Stage::StoppingSupervisor,
        Stage::DisablingRadios,
        Stage::WaitingFsSync,
        Stage::ConfirmingRadiosOff,
        Stage::ShuttingDownStorage,
        Stage::TerminalAction,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Stage::Idle => "idle",
            Stage::BroadcastingIntent => "broadcasting_intent",
            Stage::StoppingSupervisor => "stopping_supervisor",
            Stage::DisablingRadios => "disabling_radios",
            Stage::WaitingFsSync => "waiting_fs_sync",
            Stage::ConfirmingRadiosOff => "confirming_radios_off",
            Stage::ShuttingDownStorage => "shutting_down_storage",
            Stage::TerminalAction => "terminal_action",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Result of one phase; neither variant stops the sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PhaseOutcome {
    Completed,
    TimedOut,
}

/// Last observed state of a radio-like subsystem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubsystemStatus {
    Unknown,
    Off,
    On,
}

impl SubsystemStatus {
    pub fn is_off(&self) -> bool {
        *self == SubsystemStatus::Off
    }
}
