mod broadcast;
mod contracts;
mod fs_sync;
mod mount;
mod radio;
mod supervisor;

#[cfg(test)]
pub(crate) mod mock;

pub use broadcast::HookBroadcaster;
pub use contracts::{
    ActivitySupervisor, CellularRadio, IntentBroadcaster, MountManager, PollTarget,
    ShortRangeRadio,
};
pub use fs_sync::SysfsSyncIndicator;
pub use mount::SyncingMountManager;
pub use radio::{
    request_cellular_off, request_short_range_off, CellularProbe, RfkillRadio, ShortRangeProbe,
};
pub use supervisor::CommandSupervisor;

use std::sync::Arc;

/// Services the sequencer talks to. `None` means the service is absent and
/// its phase is treated as already satisfied.
#[derive(Clone, Default)]
pub struct Collaborators {
    pub broadcaster: Option<Arc<dyn IntentBroadcaster>>,
    pub supervisor: Option<Arc<dyn ActivitySupervisor>>,
    pub cellular: Option<Arc<dyn CellularRadio>>,
    pub short_range: Option<Arc<dyn ShortRangeRadio>>,
    pub mount: Option<Arc<dyn MountManager>>,
    pub sync_indicators: Vec<Arc<dyn PollTarget>>,
}

impl Collaborators {
    /// Names of the services that are present, for logging
    pub fn present(&self) -> Vec<&'static str> {
        let mut present = Vec::new();
        if self.broadcaster.is_some() {
            present.push("broadcaster");
        }
        if self.supervisor.is_some() {
            present.push("supervisor");
        }
        if self.cellular.is_some() {
            present.push("cellular");
        }
        if self.short_range.is_some() {
            present.push("short_range");
        }
        if self.mount.is_some() {
            present.push("mount");
        }
        if !self.sync_indicators.is_empty() {
            present.push("fs_sync");
        }
        present
    }
}
