use super::types::ShutdownRequest;
use crate::platform::{PowerControl, Vibrator};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, warn};

/// Final, irreversible power action.
///
/// With a real [`PowerControl`] a successful call never returns. A reboot
/// that does return is followed by power-off, so this only returns when
/// power-off itself returned, as with a dry-run or test double.
pub struct TerminalAction {
    power: Arc<dyn PowerControl>,
    vibrator: Option<Arc<dyn Vibrator>>,
    vibrate_duration: Duration,
}

impl TerminalAction {
    pub fn new(power: Arc<dyn PowerControl>) -> Self {
        Self {
            power,
            vibrator: None,
            vibrate_duration: Duration::ZERO,
        }
    }

    /// Vibrate for `duration` before powering off (not before reboots)
    pub fn with_vibrator(mut self, vibrator: Arc<dyn Vibrator>, duration: Duration) -> Self {
        self.vibrator = Some(vibrator);
        self.vibrate_duration = duration;
        self
    }

    pub fn vibrate_duration(&self) -> Duration {
        self.vibrate_duration
    }

    pub async fn execute(&self, request: &ShutdownRequest) {
        if request.is_reboot {
            info!(
                "Rebooting, reason: {}",
                request.reason.as_deref().unwrap_or("none")
            );
            // A reboot that comes back, with or without an error, still ends in power-off
            match self.power.reboot(request.reason.as_deref()) {
                Ok(()) => warn!("Reboot returned, will attempt shutdown instead"),
                Err(e) => error!("Reboot failed, will attempt shutdown instead: {}", e),
            }
        } else if !self.vibrate_duration.is_zero() {
            if let Some(vibrator) = &self.vibrator {
                if let Err(e) = vibrator.vibrate(self.vibrate_duration) {
                    warn!("Failed to vibrate during shutdown: {}", e);
                }
            }
            // The vibrator runs asynchronously; powering off now would cut it short
            sleep(self.vibrate_duration).await;
        }

        info!("Performing low-level shutdown...");
        if let Err(e) = self.power.power_off() {
            error!("Low-level power off failed: {}", e);
        }
    }
}
