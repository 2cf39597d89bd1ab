use super::types::{PhaseOutcome, Stage, SubsystemStatus};
use super::waiter::{wait_for, CompletionSignal, WaitResult};
use crate::adapters::PollTarget;
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

/// Fixed-interval, bounded sampling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl PollPolicy {
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
        }
    }

    /// Upper bound on the time a poll loop may take
    pub fn ceiling(&self) -> Duration {
        self.interval * self.max_attempts
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::new(Duration::from_millis(500), 16)
    }
}

/// How a phase learns that its work is done
pub enum Completion {
    /// Nothing left to wait for
    Immediate,
    /// Wait for a collaborator callback
    Signal(CompletionSignal),
    /// Sample every target until all report off
    Poll {
        policy: PollPolicy,
        targets: Vec<Arc<dyn PollTarget>>,
    },
}

impl Completion {
    pub async fn await_completion(self, deadline: Instant) -> PhaseOutcome {
        match self {
            Completion::Immediate => PhaseOutcome::Completed,
            Completion::Signal(signal) => match wait_for(&signal, deadline).await {
                WaitResult::Signaled => PhaseOutcome::Completed,
                WaitResult::Expired => PhaseOutcome::TimedOut,
            },
            Completion::Poll { policy, targets } => poll_until_off(policy, &targets).await,
        }
    }
}

/// Sample `targets` until all of them are off or `policy.max_attempts` ticks
/// have passed. A target that is off is never sampled again, and a target
/// that cannot be reached counts as off.
pub async fn poll_until_off(policy: PollPolicy, targets: &[Arc<dyn PollTarget>]) -> PhaseOutcome {
    let mut statuses = vec![SubsystemStatus::Unknown; targets.len()];

    for attempt in 1..=policy.max_attempts {
        for (target, status) in targets.iter().zip(statuses.iter_mut()) {
            if status.is_off() {
                continue;
            }
            *status = match target.is_off().await {
                Ok(true) => SubsystemStatus::Off,
                Ok(false) => SubsystemStatus::On,
                Err(e) => {
                    warn!("{} unavailable while polling, treating as off: {}", target.name(), e);
                    SubsystemStatus::Off
                }
            };
        }

        if statuses.iter().all(SubsystemStatus::is_off) {
            debug!("All poll targets off after {} attempt(s)", attempt);
            return PhaseOutcome::Completed;
        }

        if attempt < policy.max_attempts {
            debug!(
                "Poll attempt {}/{} incomplete, retrying in {:?}",
                attempt, policy.max_attempts, policy.interval
            );
            sleep(policy.interval).await;
        }
    }

    let pending: Vec<&str> = targets
        .iter()
        .zip(statuses.iter())
        .filter(|(_, status)| !status.is_off())
        .map(|(target, _)| target.name())
        .collect();
    info!(
        "Gave up polling after {} attempts, still pending: {}",
        policy.max_attempts,
        pending.join(", ")
    );
    PhaseOutcome::TimedOut
}

/// One bounded step of the shutdown sequence.
///
/// `begin` issues the phase's requests and says how completion is observed.
/// The sequencer bounds `begin` plus the completion wait by `deadline`, and
/// treats an error from `begin` as an already satisfied phase.
#[async_trait]
pub trait Phase: Send + Sync {
    fn stage(&self) -> Stage;

    fn deadline(&self) -> Duration;

    async fn begin(&self) -> Result<Completion>;
}
