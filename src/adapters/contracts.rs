use crate::error::Result;
use crate::sequencer::{CompletionHandle, ShutdownRequest, SubsystemStatus};
use async_trait::async_trait;
use std::time::Duration;

/// Notifies interested listeners that the device is about to go down.
#[async_trait]
pub trait IntentBroadcaster: Send + Sync {
    /// Start notifying listeners. `on_done` is completed once the last
    /// listener has acknowledged; the call itself must not wait for that.
    async fn broadcast_shutdown(
        &self,
        request: &ShutdownRequest,
        on_done: CompletionHandle,
    ) -> Result<()>;
}

/// Process supervisor owning the managed application processes.
#[async_trait]
pub trait ActivitySupervisor: Send + Sync {
    /// Terminate managed processes, giving them at most `timeout`.
    async fn shutdown(&self, timeout: Duration) -> Result<()>;
}

/// Cellular modem stack, possibly with several concurrent instances
/// (one per subscription).
#[async_trait]
pub trait CellularRadio: Send + Sync {
    async fn instance_count(&self) -> Result<usize>;

    async fn is_radio_on(&self, instance: usize) -> Result<bool>;

    /// Ask one instance to turn its radio off. Fire and forget.
    async fn set_radio_off(&self, instance: usize) -> Result<()>;
}

/// Short-range radio stack.
#[async_trait]
pub trait ShortRangeRadio: Send + Sync {
    async fn state(&self) -> Result<SubsystemStatus>;

    /// Disable the radio without persisting the new state. Fire and forget.
    async fn disable(&self) -> Result<()>;
}

/// Storage / mount manager.
#[async_trait]
pub trait MountManager: Send + Sync {
    /// Start releasing storage. `on_done` is completed exactly once with a
    /// status code when the manager has finished.
    async fn shutdown(&self, on_done: CompletionHandle) -> Result<()>;
}

/// Anything the sequencer samples on a fixed interval until it is quiescent.
#[async_trait]
pub trait PollTarget: Send + Sync {
    fn name(&self) -> &str;

    /// `true` once the subsystem has settled (radio off, cache synced).
    async fn is_off(&self) -> Result<bool>;
}
