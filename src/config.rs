use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PowerdownConfig {
    pub sequence: SequenceConfig,
    pub terminal: TerminalConfig,
    pub properties: PropertiesConfig,
    pub radio: RadioConfig,
    pub fs_sync: FsSyncConfig,
    pub supervisor: SupervisorConfig,
    pub broadcast: BroadcastConfig,
    pub storage: StorageConfig,
    pub events: EventsConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SequenceConfig {
    /// Time allowed for shutdown listeners to acknowledge
    #[serde(default = "default_broadcast_timeout_ms")]
    pub broadcast_timeout_ms: u64,

    /// Time allowed for the process supervisor to stop managed processes
    #[serde(default = "default_supervisor_timeout_ms")]
    pub supervisor_timeout_ms: u64,

    /// Time allowed for the radio off requests to be issued
    #[serde(default = "default_radio_timeout_ms")]
    pub radio_timeout_ms: u64,

    /// Time allowed for the mount manager to acknowledge shutdown
    #[serde(default = "default_storage_timeout_ms")]
    pub storage_timeout_ms: u64,

    /// Interval between two samples of a poll-based subsystem
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Number of samples before a poll-based phase gives up
    #[serde(default = "default_max_poll_attempts")]
    pub max_poll_attempts: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TerminalConfig {
    /// Vibration before power off, in milliseconds (0 disables it)
    #[serde(default = "default_vibrate_ms")]
    pub vibrate_ms: u64,

    /// Timed output device driving the vibrator
    #[serde(default = "default_vibrator_device")]
    pub vibrator_device: String,

    /// Log the power action instead of performing it
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PropertiesConfig {
    /// Directory holding one file per persisted property
    #[serde(default = "default_properties_dir")]
    pub dir: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RadioConfig {
    /// Root of the rfkill class in sysfs
    #[serde(default = "default_rfkill_root")]
    pub rfkill_root: String,

    /// rfkill type of the cellular modems
    #[serde(default = "default_cellular_type")]
    pub cellular_type: String,

    /// rfkill type of the short-range radio
    #[serde(default = "default_short_range_type")]
    pub short_range_type: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct FsSyncConfig {
    /// Single-byte files reading '1' once the radio-side caches are flushed
    #[serde(default = "default_sync_indicators")]
    pub indicators: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SupervisorConfig {
    /// Command asking the process supervisor to stop managed applications
    #[serde(default)]
    pub command: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BroadcastConfig {
    /// Directory of executables notified of the impending shutdown
    #[serde(default = "default_hook_dir")]
    pub hook_dir: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StorageConfig {
    /// Mount points released after the final sync
    #[serde(default)]
    pub mount_points: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EventsConfig {
    /// Event bus capacity
    #[serde(default = "default_event_bus_capacity")]
    pub capacity: usize,
}

impl SequenceConfig {
    pub fn broadcast_timeout(&self) -> Duration {
        Duration::from_millis(self.broadcast_timeout_ms)
    }

    pub fn supervisor_timeout(&self) -> Duration {
        Duration::from_millis(self.supervisor_timeout_ms)
    }

    pub fn radio_timeout(&self) -> Duration {
        Duration::from_millis(self.radio_timeout_ms)
    }

    pub fn storage_timeout(&self) -> Duration {
        Duration::from_millis(self.storage_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl TerminalConfig {
    pub fn vibrate_duration(&self) -> Duration {
        Duration::from_millis(self.vibrate_ms)
    }
}

impl PowerdownConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("powerdown.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default(
                "sequence.broadcast_timeout_ms",
                default_broadcast_timeout_ms(),
            )?
            .set_default(
                "sequence.supervisor_timeout_ms",
                default_supervisor_timeout_ms(),
            )?
            .set_default("sequence.radio_timeout_ms", default_radio_timeout_ms())?
            .set_default("sequence.storage_timeout_ms", default_storage_timeout_ms())?
            .set_default("sequence.poll_interval_ms", default_poll_interval_ms())?
            .set_default("sequence.max_poll_attempts", default_max_poll_attempts())?
            .set_default("terminal.vibrate_ms", default_vibrate_ms())?
            .set_default("terminal.vibrator_device", default_vibrator_device())?
            .set_default("terminal.dry_run", false)?
            .set_default("properties.dir", default_properties_dir())?
            .set_default("radio.rfkill_root", default_rfkill_root())?
            .set_default("radio.cellular_type", default_cellular_type())?
            .set_default("radio.short_range_type", default_short_range_type())?
            .set_default("fs_sync.indicators", default_sync_indicators())?
            .set_default("supervisor.command", Vec::<String>::new())?
            .set_default("broadcast.hook_dir", default_hook_dir())?
            .set_default("storage.mount_points", Vec::<String>::new())?
            .set_default("events.capacity", default_event_bus_capacity() as i64)?
            // Add configuration file (optional)
            .add_source(File::with_name(&path_str).required(false))
            // Environment overrides, e.g. POWERDOWN_TERMINAL__DRY_RUN=true
            .add_source(
                Environment::with_prefix("POWERDOWN")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let config: PowerdownConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sequence.poll_interval_ms == 0 {
            return Err(ConfigError::Message(
                "Poll interval must be greater than 0".to_string(),
            ));
        }

        if self.sequence.max_poll_attempts == 0 {
            return Err(ConfigError::Message(
                "Max poll attempts must be greater than 0".to_string(),
            ));
        }

        let timeouts = [
            ("broadcast_timeout_ms", self.sequence.broadcast_timeout_ms),
            ("supervisor_timeout_ms", self.sequence.supervisor_timeout_ms),
            ("radio_timeout_ms", self.sequence.radio_timeout_ms),
            ("storage_timeout_ms", self.sequence.storage_timeout_ms),
        ];
        for (name, value) in timeouts {
            if value == 0 {
                return Err(ConfigError::Message(format!(
                    "Sequence {} must be greater than 0",
                    name
                )));
            }
        }

        if self.properties.dir.is_empty() {
            return Err(ConfigError::Message(
                "Property store directory must not be empty".to_string(),
            ));
        }

        if self.events.capacity == 0 {
            return Err(ConfigError::Message(
                "Event bus capacity must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Render the configuration as TOML
    pub fn to_toml(&self) -> crate::error::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

impl Default for PowerdownConfig {
    fn default() -> Self {
        Self {
            sequence: SequenceConfig {
                broadcast_timeout_ms: default_broadcast_timeout_ms(),
                supervisor_timeout_ms: default_supervisor_timeout_ms(),
                radio_timeout_ms: default_radio_timeout_ms(),
                storage_timeout_ms: default_storage_timeout_ms(),
                poll_interval_ms: default_poll_interval_ms(),
                max_poll_attempts: default_max_poll_attempts(),
            },
            terminal: TerminalConfig {
                vibrate_ms: default_vibrate_ms(),
                vibrator_device: default_vibrator_device(),
                dry_run: false,
            },
            properties: PropertiesConfig {
                dir: default_properties_dir(),
            },
            radio: RadioConfig {
                rfkill_root: default_rfkill_root(),
                cellular_type: default_cellular_type(),
                short_range_type: default_short_range_type(),
            },
            fs_sync: FsSyncConfig {
                indicators: default_sync_indicators(),
            },
            supervisor: SupervisorConfig {
                command: Vec::new(),
            },
            broadcast: BroadcastConfig {
                hook_dir: default_hook_dir(),
            },
            storage: StorageConfig {
                mount_points: Vec::new(),
            },
            events: EventsConfig {
                capacity: default_event_bus_capacity(),
            },
        }
    }
}

// Default value functions
fn default_broadcast_timeout_ms() -> u64 {
    10_000
}
fn default_supervisor_timeout_ms() -> u64 {
    10_000
}
fn default_radio_timeout_ms() -> u64 {
    10_000
}
fn default_storage_timeout_ms() -> u64 {
    20_000
}
fn default_poll_interval_ms() -> u64 {
    500
}
fn default_max_poll_attempts() -> u32 {
    16
}

fn default_vibrate_ms() -> u64 {
    500
}
fn default_vibrator_device() -> String {
    "/sys/class/timed_output/vibrator/enable".to_string()
}

fn default_properties_dir() -> String {
    "/run/powerdown/properties".to_string()
}

fn default_rfkill_root() -> String {
    "/sys/class/rfkill".to_string()
}
fn default_cellular_type() -> String {
    "wwan".to_string()
}
fn default_short_range_type() -> String {
    "bluetooth".to_string()
}

fn default_sync_indicators() -> Vec<String> {
    vec![
        "/sys/devices/platform/rs300000a7.65536/sync_sts".to_string(),
        "/sys/devices/platform/rs300100a7.65536/sync_sts".to_string(),
    ]
}

fn default_hook_dir() -> String {
    "/etc/powerdown/shutdown.d".to_string()
}

fn default_event_bus_capacity() -> usize {
    64
}
