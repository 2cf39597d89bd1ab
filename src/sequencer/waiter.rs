use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, warn};

/// How a deadline wait ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitResult {
    Signaled,
    Expired,
}

#[derive(Debug, Default)]
struct SignalState {
    raised: Mutex<bool>,
    notify: Notify,
}

/// One-shot completion flag shared between a collaborator callback and the
/// sequencer worker. A fresh signal is created for every phase.
#[derive(Debug, Clone, Default)]
pub struct CompletionSignal {
    inner: Arc<SignalState>,
}

impl CompletionSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the signal. Raising more than once is harmless.
    pub fn raise(&self) {
        {
            let mut raised = self.inner.raised.lock();
            *raised = true;
        }
        // notify_one stores a permit when nobody is waiting yet
        self.inner.notify.notify_one();
    }

    pub fn is_raised(&self) -> bool {
        *self.inner.raised.lock()
    }

    /// Handle passed to a callback-based collaborator
    pub fn handle(&self, source: &'static str) -> CompletionHandle {
        CompletionHandle {
            signal: self.clone(),
            source,
        }
    }
}

/// Acknowledgement callback handed to a collaborator.
///
/// Consumed on use, so a collaborator acknowledges at most once.
#[derive(Debug)]
pub struct CompletionHandle {
    signal: CompletionSignal,
    source: &'static str,
}

impl CompletionHandle {
    /// Acknowledge completion with a collaborator specific status code
    pub fn done(self, status: i32) {
        if status == 0 {
            debug!("{} acknowledged shutdown", self.source);
        } else {
            warn!("Result code {} from {} shutdown", status, self.source);
        }
        self.signal.raise();
    }

    pub fn source(&self) -> &'static str {
        self.source
    }
}

/// Wait until `signal` is raised or `deadline` passes, whichever comes first.
///
/// A wake-up that finds the signal still lowered goes back to waiting for
/// whatever is left of the deadline.
pub async fn wait_for(signal: &CompletionSignal, deadline: Instant) -> WaitResult {
    loop {
        if signal.is_raised() {
            return WaitResult::Signaled;
        }

        match timeout_at(deadline, signal.inner.notify.notified()).await {
            Ok(()) => {
                if !signal.is_raised() {
                    debug!("Spurious wake-up, resuming wait");
                }
            }
            Err(_) => {
                return if signal.is_raised() {
                    WaitResult::Signaled
                } else {
                    WaitResult::Expired
                };
            }
        }
    }
}
