use super::PowerdownApp;
use crate::adapters::{
    ActivitySupervisor, CellularRadio, Collaborators, CommandSupervisor, HookBroadcaster,
    IntentBroadcaster, MountManager, PollTarget, RfkillRadio, ShortRangeRadio,
    SyncingMountManager, SysfsSyncIndicator,
};
use crate::config::PowerdownConfig;
use std::sync::Arc;
use tracing::{debug, info};

impl PowerdownApp {
    /// Build the collaborator set described by the configuration.
    ///
    /// Empty settings leave the matching service absent.
    pub fn build_collaborators(config: &PowerdownConfig) -> Collaborators {
        let mut collaborators = Collaborators::default();

        if !config.broadcast.hook_dir.is_empty() {
            let broadcaster: Arc<dyn IntentBroadcaster> =
                Arc::new(HookBroadcaster::new(&config.broadcast.hook_dir));
            collaborators.broadcaster = Some(broadcaster);
        }

        match CommandSupervisor::from_command_line(&config.supervisor.command) {
            Some(supervisor) => {
                let supervisor: Arc<dyn ActivitySupervisor> = Arc::new(supervisor);
                collaborators.supervisor = Some(supervisor);
            }
            None => debug!("No supervisor command configured"),
        }

        if !config.radio.rfkill_root.is_empty() {
            if !config.radio.cellular_type.is_empty() {
                let cellular: Arc<dyn CellularRadio> = Arc::new(RfkillRadio::new(
                    &config.radio.rfkill_root,
                    config.radio.cellular_type.clone(),
                ));
                collaborators.cellular = Some(cellular);
            }
            if !config.radio.short_range_type.is_empty() {
                let short_range: Arc<dyn ShortRangeRadio> = Arc::new(RfkillRadio::new(
                    &config.radio.rfkill_root,
                    config.radio.short_range_type.clone(),
                ));
                collaborators.short_range = Some(short_range);
            }
        }

        // Always present: flushing page cache is useful without mount points
        let mount: Arc<dyn MountManager> =
            Arc::new(SyncingMountManager::new(config.storage.mount_points.clone()));
        collaborators.mount = Some(mount);

        collaborators.sync_indicators = config
            .fs_sync
            .indicators
            .iter()
            .map(|path| Arc::new(SysfsSyncIndicator::new(path)) as Arc<dyn PollTarget>)
            .collect();

        info!(
            "Configured {} sync indicator(s) and {} mount point(s)",
            collaborators.sync_indicators.len(),
            config.storage.mount_points.len()
        );
        collaborators
    }
}
