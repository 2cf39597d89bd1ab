use super::guard::SingleFlightGuard;
use super::phase::{Phase, PollPolicy};
use super::phases::{
    BroadcastIntentPhase, ConfirmRadiosOffPhase, DisableRadiosPhase, FsSyncPhase,
    ShutdownStoragePhase, StopSupervisorPhase,
};
use super::terminal::TerminalAction;
use super::types::{PhaseOutcome, SequenceState, ShutdownRequest, Stage};
use crate::adapters::Collaborators;
use crate::config::SequenceConfig;
use crate::error::{PowerdownError, Result};
use crate::events::{EventBus, SequenceEvent};
use crate::platform::{PropertyStore, SHUTDOWN_RUNNING_PROPERTY};
use crate::recovery::{persist_marker, ShutdownMarker};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant};
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// What happened during one sequence run
#[derive(Debug, Clone)]
pub struct SequenceReport {
    pub sequence_id: Uuid,
    pub request: ShutdownRequest,
    pub phases: Vec<(Stage, PhaseOutcome)>,
}

impl SequenceReport {
    pub fn timed_out(&self) -> Vec<Stage> {
        self.phases
            .iter()
            .filter(|(_, outcome)| *outcome == PhaseOutcome::TimedOut)
            .map(|(stage, _)| *stage)
            .collect()
    }
}

/// Drives the shutdown phases in order and then runs the terminal action
/// exactly once.
pub struct ShutdownSequencer {
    guard: Arc<SingleFlightGuard>,
    collaborators: Collaborators,
    terminal: TerminalAction,
    properties: Arc<dyn PropertyStore>,
    event_bus: Arc<EventBus>,
    timing: SequenceConfig,
    stage: Mutex<Stage>,
    runtime: Handle,
}

impl ShutdownSequencer {
    pub fn builder() -> ShutdownSequencerBuilder {
        ShutdownSequencerBuilder::new()
    }

    /// Start the sequence on a dedicated task.
    ///
    /// Safe to call from threads outside the runtime; the task is spawned on
    /// the runtime captured at build time. Returns `None` when a sequence was
    /// already started by an earlier caller; the request is then ignored.
    pub fn begin_shutdown(
        self: &Arc<Self>,
        request: ShutdownRequest,
    ) -> Option<JoinHandle<SequenceReport>> {
        if !self.guard.try_start() {
            info!("Request to {} while a sequence is already running, returning", request.action());
            return None;
        }

        let sequencer = Arc::clone(self);
        Some(self.runtime.spawn(async move {
            sequencer.run_sequence(request).await
        }))
    }

    pub fn shutdown(self: &Arc<Self>) -> Option<JoinHandle<SequenceReport>> {
        self.begin_shutdown(ShutdownRequest::shutdown())
    }

    pub fn reboot(self: &Arc<Self>, reason: Option<String>) -> Option<JoinHandle<SequenceReport>> {
        self.begin_shutdown(ShutdownRequest::reboot(reason))
    }

    pub fn current_stage(&self) -> Stage {
        *self.stage.lock()
    }

    pub fn state(&self) -> SequenceState {
        self.guard.state()
    }

    pub fn event_bus(&self) -> Arc<EventBus> {
        Arc::clone(&self.event_bus)
    }

    async fn run_sequence(&self, request: ShutdownRequest) -> SequenceReport {
        let sequence_id = Uuid::new_v4();
        let span = info_span!("shutdown_sequence", id = %sequence_id, action = request.action());

        async {
            info!("Beginning {} sequence", request.action());
            self.record_intent(&request, sequence_id);

            let mut outcomes = Vec::with_capacity(Stage::SEQUENCE.len());
            for phase in self.phases(&request) {
                let outcome = self.run_phase(phase.as_ref()).await;
                outcomes.push((phase.stage(), outcome));
            }

            // Completed before the action so nothing can re-enter it
            self.set_stage(Stage::TerminalAction);
            self.guard.mark_completed();
            let _ = self.event_bus.publish(SequenceEvent::StageEntered {
                stage: Stage::TerminalAction,
                timestamp: SystemTime::now(),
            });
            let _ = self.event_bus.publish(SequenceEvent::TerminalActionInvoked {
                is_reboot: request.is_reboot,
                reason: request.reason.clone(),
            });

            self.terminal.execute(&request).await;
            warn!("Terminal action returned, device is still powered");

            SequenceReport {
                sequence_id,
                request,
                phases: outcomes,
            }
        }
        .instrument(span)
        .await
    }

    /// Leave a trace that survives this process dying mid-sequence
    fn record_intent(&self, request: &ShutdownRequest, sequence_id: Uuid) {
        if let Err(e) = self.properties.set(SHUTDOWN_RUNNING_PROPERTY, "true") {
            warn!("Failed to publish shutdown running marker: {}", e);
        }

        let marker = ShutdownMarker::new(request, sequence_id);
        if let Err(e) = persist_marker(self.properties.as_ref(), &marker) {
            error!("Failed to persist shutdown marker: {}", e);
        }
    }

    fn phases(&self, request: &ShutdownRequest) -> Vec<Box<dyn Phase>> {
        let policy = PollPolicy::new(self.timing.poll_interval(), self.timing.max_poll_attempts);
        let c = &self.collaborators;

        vec![
            Box::new(BroadcastIntentPhase {
                broadcaster: c.broadcaster.clone(),
                request: request.clone(),
                timeout: self.timing.broadcast_timeout(),
            }),
            Box::new(StopSupervisorPhase {
                supervisor: c.supervisor.clone(),
                timeout: self.timing.supervisor_timeout(),
            }),
            Box::new(DisableRadiosPhase {
                short_range: c.short_range.clone(),
                cellular: c.cellular.clone(),
                properties: Arc::clone(&self.properties),
                timeout: self.timing.radio_timeout(),
            }),
            Box::new(FsSyncPhase {
                indicators: c.sync_indicators.clone(),
                policy,
            }),
            Box::new(ConfirmRadiosOffPhase {
                short_range: c.short_range.clone(),
                cellular: c.cellular.clone(),
                policy,
            }),
            Box::new(ShutdownStoragePhase {
                mount: c.mount.clone(),
                timeout: self.timing.storage_timeout(),
            }),
        ]
    }

    async fn run_phase(&self, phase: &dyn Phase) -> PhaseOutcome {
        let stage = phase.stage();
        self.set_stage(stage);
        let _ = self.event_bus.publish(SequenceEvent::StageEntered {
            stage,
            timestamp: SystemTime::now(),
        });

        // Every phase gets its full budget, measured from its own start
        let started = Instant::now();
        let deadline = started + phase.deadline();

        let work = async {
            match phase.begin().await {
                Ok(completion) => completion.await_completion(deadline).await,
                Err(e) => {
                    Self::log_begin_failure(stage, &e);
                    PhaseOutcome::Completed
                }
            }
        };
        let outcome = timeout_at(deadline, work)
            .await
            .unwrap_or(PhaseOutcome::TimedOut);

        let elapsed = started.elapsed();
        match outcome {
            PhaseOutcome::Completed => info!("Phase {} completed in {:?}", stage, elapsed),
            PhaseOutcome::TimedOut => warn!(
                "Phase {} timed out after {:?}, continuing shutdown",
                stage, elapsed
            ),
        }

        let _ = self.event_bus.publish(SequenceEvent::PhaseFinished {
            stage,
            outcome,
            elapsed,
        });
        outcome
    }

    fn log_begin_failure(stage: Stage, e: &PowerdownError) {
        if e.is_fail_open() {
            warn!("Phase {}: {}, treating as already complete", stage, e);
        } else {
            error!("Phase {} failed: {}, continuing shutdown", stage, e);
        }
    }

    fn set_stage(&self, stage: Stage) {
        *self.stage.lock() = stage;
    }
}

/// Builder for [`ShutdownSequencer`]
pub struct ShutdownSequencerBuilder {
    guard: Option<Arc<SingleFlightGuard>>,
    collaborators: Collaborators,
    terminal: Option<TerminalAction>,
    properties: Option<Arc<dyn PropertyStore>>,
    event_bus: Option<Arc<EventBus>>,
    timing: SequenceConfig,
    runtime: Option<Handle>,
}

impl ShutdownSequencerBuilder {
    pub fn new() -> Self {
        Self {
            guard: None,
            collaborators: Collaborators::default(),
            terminal: None,
            properties: None,
            event_bus: None,
            timing: crate::config::PowerdownConfig::default().sequence,
            runtime: None,
        }
    }

    /// Share a guard with other entry points; a fresh one is created otherwise
    pub fn guard(mut self, guard: Arc<SingleFlightGuard>) -> Self {
        self.guard = Some(guard);
        self
    }

    pub fn collaborators(mut self, collaborators: Collaborators) -> Self {
        self.collaborators = collaborators;
        self
    }

    pub fn terminal(mut self, terminal: TerminalAction) -> Self {
        self.terminal = Some(terminal);
        self
    }

    pub fn properties(mut self, properties: Arc<dyn PropertyStore>) -> Self {
        self.properties = Some(properties);
        self
    }

    pub fn event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn timing(mut self, timing: SequenceConfig) -> Self {
        self.timing = timing;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.timing.poll_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Runtime that sequences are spawned on; defaults to the one `build`
    /// is called from
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn build(self) -> Result<ShutdownSequencer> {
        let terminal = self.terminal.ok_or_else(|| PowerdownError::Fatal {
            message: "Shutdown sequencer requires a terminal action".to_string(),
        })?;
        let properties = self
            .properties
            .ok_or_else(|| PowerdownError::property("*", "no property store configured"))?;
        let runtime = match self.runtime {
            Some(runtime) => runtime,
            None => Handle::try_current().map_err(|e| PowerdownError::Fatal {
                message: format!("Shutdown sequencer needs a tokio runtime: {}", e),
            })?,
        };

        Ok(ShutdownSequencer {
            guard: self.guard.unwrap_or_default(),
            collaborators: self.collaborators,
            terminal,
            properties,
            event_bus: self
                .event_bus
                .unwrap_or_else(|| Arc::new(EventBus::new(64))),
            timing: self.timing,
            stage: Mutex::new(Stage::Idle),
            runtime,
        })
    }
}

impl Default for ShutdownSequencerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
