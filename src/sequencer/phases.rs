use super::phase::{Completion, Phase, PollPolicy};
use super::types::{ShutdownRequest, Stage};
use super::waiter::CompletionSignal;
use crate::adapters::{
    request_cellular_off, request_short_range_off, ActivitySupervisor, CellularProbe,
    CellularRadio, IntentBroadcaster, MountManager, PollTarget, ShortRangeProbe, ShortRangeRadio,
};
use crate::error::{PowerdownError, Result};
use crate::platform::{PropertyStore, RADIO_SHUTDOWN_PROPERTY};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

pub struct BroadcastIntentPhase {
    pub(super) broadcaster: Option<Arc<dyn IntentBroadcaster>>,
    pub(super) request: ShutdownRequest,
    pub(super) timeout: Duration,
}

#[async_trait]
impl Phase for BroadcastIntentPhase {
    fn stage(&self) -> Stage {
        Stage::BroadcastingIntent
    }

    fn deadline(&self) -> Duration {
        self.timeout
    }

    async fn begin(&self) -> Result<Completion> {
        info!("Sending shutdown broadcast...");
        let broadcaster = self
            .broadcaster
            .as_ref()
            .ok_or_else(|| PowerdownError::unreachable("intent broadcaster"))?;

        let signal = CompletionSignal::new();
        broadcaster
            .broadcast_shutdown(&self.request, signal.handle("shutdown broadcast"))
            .await?;
        Ok(Completion::Signal(signal))
    }
}

pub struct StopSupervisorPhase {
    pub(super) supervisor: Option<Arc<dyn ActivitySupervisor>>,
    pub(super) timeout: Duration,
}

#[async_trait]
impl Phase for StopSupervisorPhase {
    fn stage(&self) -> Stage {
        Stage::StoppingSupervisor
    }

    fn deadline(&self) -> Duration {
        self.timeout
    }

    async fn begin(&self) -> Result<Completion> {
        info!("Shutting down activity supervisor...");
        let supervisor = self
            .supervisor
            .as_ref()
            .ok_or_else(|| PowerdownError::unreachable("activity supervisor"))?;

        supervisor.shutdown(self.timeout).await?;
        Ok(Completion::Immediate)
    }
}

pub struct DisableRadiosPhase {
    pub(super) short_range: Option<Arc<dyn ShortRangeRadio>>,
    pub(super) cellular: Option<Arc<dyn CellularRadio>>,
    pub(super) properties: Arc<dyn PropertyStore>,
    pub(super) timeout: Duration,
}

#[async_trait]
impl Phase for DisableRadiosPhase {
    fn stage(&self) -> Stage {
        Stage::DisablingRadios
    }

    fn deadline(&self) -> Duration {
        self.timeout
    }

    async fn begin(&self) -> Result<Completion> {
        // Published before any radio call, a hung radio must not suppress it
        if let Err(e) = self.properties.set(RADIO_SHUTDOWN_PROPERTY, "true") {
            warn!("Failed to publish radio shutdown marker: {}", e);
        }

        // One radio failing must not keep the other one on
        match &self.short_range {
            Some(radio) => {
                if let Err(e) = request_short_range_off(radio.as_ref()).await {
                    error!("Error during short-range radio shutdown: {}", e);
                }
            }
            None => info!("No short-range radio present"),
        }

        match &self.cellular {
            Some(radio) => {
                if let Err(e) = request_cellular_off(radio.as_ref()).await {
                    error!("Error during cellular radio shutdown: {}", e);
                }
            }
            None => info!("No cellular radio present"),
        }

        Ok(Completion::Immediate)
    }
}

pub struct FsSyncPhase {
    pub(super) indicators: Vec<Arc<dyn PollTarget>>,
    pub(super) policy: PollPolicy,
}

#[async_trait]
impl Phase for FsSyncPhase {
    fn stage(&self) -> Stage {
        Stage::WaitingFsSync
    }

    fn deadline(&self) -> Duration {
        self.policy.ceiling()
    }

    async fn begin(&self) -> Result<Completion> {
        info!("Waiting for radio file system sync to complete...");
        Ok(Completion::Poll {
            policy: self.policy,
            targets: self.indicators.clone(),
        })
    }
}

pub struct ConfirmRadiosOffPhase {
    pub(super) short_range: Option<Arc<dyn ShortRangeRadio>>,
    pub(super) cellular: Option<Arc<dyn CellularRadio>>,
    pub(super) policy: PollPolicy,
}

#[async_trait]
impl Phase for ConfirmRadiosOffPhase {
    fn stage(&self) -> Stage {
        Stage::ConfirmingRadiosOff
    }

    fn deadline(&self) -> Duration {
        self.policy.ceiling()
    }

    async fn begin(&self) -> Result<Completion> {
        info!("Waiting for short-range and cellular radios...");
        let mut targets: Vec<Arc<dyn PollTarget>> = Vec::with_capacity(2);
        if let Some(radio) = &self.short_range {
            targets.push(Arc::new(ShortRangeProbe::new(Arc::clone(radio))));
        }
        if let Some(radio) = &self.cellular {
            targets.push(Arc::new(CellularProbe::new(Arc::clone(radio))));
        }

        Ok(Completion::Poll {
            policy: self.policy,
            targets,
        })
    }
}

pub struct ShutdownStoragePhase {
    pub(super) mount: Option<Arc<dyn MountManager>>,
    pub(super) timeout: Duration,
}

#[async_trait]
impl Phase for ShutdownStoragePhase {
    fn stage(&self) -> Stage {
        Stage::ShuttingDownStorage
    }

    fn deadline(&self) -> Duration {
        self.timeout
    }

    async fn begin(&self) -> Result<Completion> {
        info!("Shutting down mount manager");
        let mount = self
            .mount
            .as_ref()
            .ok_or_else(|| PowerdownError::unreachable("mount manager"))?;

        let signal = CompletionSignal::new();
        mount.shutdown(signal.handle("mount manager")).await?;
        Ok(Completion::Signal(signal))
    }
}
