use crate::error::{PowerdownError, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Haptic feedback. `vibrate` starts the motor and returns immediately.
pub trait Vibrator: Send + Sync {
    fn vibrate(&self, duration: Duration) -> Result<()>;
}

/// Vibrator behind a timed output device: writing N enables it for N ms
pub struct SysfsVibrator {
    device: PathBuf,
}

impl SysfsVibrator {
    pub fn new<P: AsRef<Path>>(device: P) -> Self {
        Self {
            device: device.as_ref().to_path_buf(),
        }
    }
}

impl Vibrator for SysfsVibrator {
    fn vibrate(&self, duration: Duration) -> Result<()> {
        debug!("Vibrating for {:?} via {}", duration, self.device.display());
        fs::write(&self.device, duration.as_millis().to_string()).map_err(|e| {
            PowerdownError::transport(
                "vibrator",
                format!("{}: {}", self.device.display(), e),
            )
        })
    }
}
