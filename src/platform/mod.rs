mod power;
mod properties;
mod vibrator;

pub use power::{LoggingPowerControl, PowerControl};
#[cfg(target_os = "linux")]
pub use power::KernelPowerControl;
pub use properties::{
    FilePropertyStore, MemoryPropertyStore, PropertyStore, RADIO_SHUTDOWN_PROPERTY,
    SHUTDOWN_ACTION_PROPERTY, SHUTDOWN_RUNNING_PROPERTY,
};
pub use vibrator::{SysfsVibrator, Vibrator};
