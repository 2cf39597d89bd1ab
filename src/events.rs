use crate::error::EventBusError;
use crate::sequencer::{PhaseOutcome, Stage};
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Progress of a shutdown sequence, for observers such as a progress UI
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SequenceEvent {
    /// The sequencer moved to a new stage
    StageEntered { stage: Stage, timestamp: SystemTime },
    /// A phase finished, either completed or timed out
    PhaseFinished {
        stage: Stage,
        outcome: PhaseOutcome,
        elapsed: Duration,
    },
    /// The terminal power action is about to run
    TerminalActionInvoked {
        is_reboot: bool,
        reason: Option<String>,
    },
}

impl SequenceEvent {
    pub fn stage(&self) -> Stage {
        match self {
            SequenceEvent::StageEntered { stage, .. } => *stage,
            SequenceEvent::PhaseFinished { stage, .. } => *stage,
            SequenceEvent::TerminalActionInvoked { .. } => Stage::TerminalAction,
        }
    }

    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self {
            SequenceEvent::StageEntered { stage, .. } => format!("Entered {}", stage),
            SequenceEvent::PhaseFinished {
                stage,
                outcome,
                elapsed,
            } => format!("{} finished: {:?} after {:?}", stage, outcome, elapsed),
            SequenceEvent::TerminalActionInvoked { is_reboot, reason } => {
                if *is_reboot {
                    format!("Rebooting ({})", reason.as_deref().unwrap_or("no reason"))
                } else {
                    "Powering off".to_string()
                }
            }
        }
    }

    /// Get the event type as a string for filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            SequenceEvent::StageEntered { .. } => "stage_entered",
            SequenceEvent::PhaseFinished { .. } => "phase_finished",
            SequenceEvent::TerminalActionInvoked { .. } => "terminal_action_invoked",
        }
    }
}

/// Event bus for sequence observers using broadcast channels
pub struct EventBus {
    sender: broadcast::Sender<SequenceEvent>,
    debug_logging: bool,
}

impl EventBus {
    /// Create a new event bus with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            debug_logging: false,
        }
    }

    /// Create a new event bus with debug logging enabled
    pub fn with_debug_logging(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            debug_logging: true,
        }
    }

    /// Subscribe to events and get a receiver
    pub fn subscribe(&self) -> broadcast::Receiver<SequenceEvent> {
        self.sender.subscribe()
    }

    /// Publish an event to all subscribers
    pub fn publish(&self, event: SequenceEvent) -> Result<usize, EventBusError> {
        if self.debug_logging {
            debug!("Publishing event: {}", event.description());
        }

        match &event {
            SequenceEvent::PhaseFinished {
                outcome: PhaseOutcome::TimedOut,
                ..
            } => warn!("{}", event.description()),
            SequenceEvent::TerminalActionInvoked { .. } => info!("{}", event.description()),
            _ => {}
        }

        self.sender
            .send(event)
            .map_err(|e| EventBusError::PublishFailed {
                details: e.to_string(),
            })
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Check if there are any active subscribers
    pub fn has_subscribers(&self) -> bool {
        self.sender.receiver_count() > 0
    }
}

impl Clone for EventBus {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            debug_logging: self.debug_logging,
        }
    }
}

/// Drain every event currently buffered in `receiver`
pub fn drain(receiver: &mut broadcast::Receiver<SequenceEvent>) -> Vec<SequenceEvent> {
    let mut events = Vec::new();
    loop {
        match receiver.try_recv() {
            Ok(event) => events.push(event),
            Err(broadcast::error::TryRecvError::Lagged(n)) => {
                warn!("Event receiver lagged behind by {} events", n);
            }
            Err(_) => break,
        }
    }
    events
}
