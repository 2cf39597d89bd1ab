use crate::adapters::Collaborators;
use crate::config::{PowerdownConfig, TerminalConfig};
use crate::error::Result;
use crate::events::EventBus;
use crate::platform::{
    FilePropertyStore, LoggingPowerControl, PowerControl, PropertyStore, SysfsVibrator,
};
use crate::sequencer::{ShutdownSequencer, SingleFlightGuard, TerminalAction};
use std::sync::Arc;
use tracing::{info, Level};

/// Wires configuration, platform backends and collaborators into one
/// sequencer for the lifetime of the process
pub struct PowerdownApp {
    pub(super) config: PowerdownConfig,
    pub(super) properties: Arc<dyn PropertyStore>,
    pub(super) power: Arc<dyn PowerControl>,
    pub(super) sequencer: Arc<ShutdownSequencer>,
}

impl PowerdownApp {
    /// Create the application with the platform backends named by `config`
    pub fn new(config: PowerdownConfig) -> Result<Self> {
        let collaborators = Self::build_collaborators(&config);
        let power = Self::power_backend(&config.terminal)?;
        let properties: Arc<dyn PropertyStore> =
            Arc::new(FilePropertyStore::new(&config.properties.dir));

        Self::with_backends(config, collaborators, power, properties)
    }

    /// Create the application around caller-supplied backends.
    ///
    /// Must be called inside a tokio runtime; sequences are spawned on it.
    pub fn with_backends(
        config: PowerdownConfig,
        collaborators: Collaborators,
        power: Arc<dyn PowerControl>,
        properties: Arc<dyn PropertyStore>,
    ) -> Result<Self> {
        info!(
            "Collaborators present: [{}]",
            collaborators.present().join(", ")
        );

        let event_bus = if tracing::enabled!(Level::DEBUG) {
            Arc::new(EventBus::with_debug_logging(config.events.capacity))
        } else {
            Arc::new(EventBus::new(config.events.capacity))
        };
        let sequencer = ShutdownSequencer::builder()
            .guard(Arc::new(SingleFlightGuard::new()))
            .collaborators(collaborators)
            .terminal(Self::terminal_action(&config.terminal, Arc::clone(&power)))
            .properties(Arc::clone(&properties))
            .event_bus(event_bus)
            .timing(config.sequence.clone())
            .build()?;

        Ok(Self {
            config,
            properties,
            power,
            sequencer: Arc::new(sequencer),
        })
    }

    pub fn sequencer(&self) -> Arc<ShutdownSequencer> {
        Arc::clone(&self.sequencer)
    }

    pub fn config(&self) -> &PowerdownConfig {
        &self.config
    }

    pub(super) fn terminal_action(
        config: &TerminalConfig,
        power: Arc<dyn PowerControl>,
    ) -> TerminalAction {
        let terminal = TerminalAction::new(power);
        if config.vibrator_device.is_empty() {
            return terminal;
        }
        terminal.with_vibrator(
            Arc::new(SysfsVibrator::new(&config.vibrator_device)),
            config.vibrate_duration(),
        )
    }

    fn power_backend(config: &TerminalConfig) -> Result<Arc<dyn PowerControl>> {
        if config.dry_run {
            info!("Dry run: power actions will only be logged");
            return Ok(Arc::new(LoggingPowerControl));
        }

        #[cfg(target_os = "linux")]
        {
            Ok(Arc::new(crate::platform::KernelPowerControl::new()))
        }

        #[cfg(not(target_os = "linux"))]
        {
            Err(crate::error::PowerdownError::fatal(
                "no power control backend for this platform, use dry_run",
            ))
        }
    }
}
