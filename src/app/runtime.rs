use super::types::{request_for_signal, Trigger};
use super::PowerdownApp;
use crate::error::{PowerdownError, Result};
use crate::recovery::resume_pending;
use crate::sequencer::{SequenceReport, ShutdownRequest};
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tokio::task::{JoinError, JoinHandle};
use tracing::{info, warn};

impl PowerdownApp {
    /// Run the sequence for `request` and wait until the terminal action
    /// returns.
    ///
    /// Returns `None` when another sequence already owns the guard.
    pub async fn run(
        &self,
        request: ShutdownRequest,
        trigger: Trigger,
    ) -> Result<Option<SequenceReport>> {
        info!("{} requested by {:?}", request.action(), trigger);

        match self.sequencer.begin_shutdown(request) {
            Some(handle) => Ok(Some(Self::join(handle).await?)),
            None => Ok(None),
        }
    }

    /// Finish a sequence a previous instance persisted but never completed
    pub async fn resume(&self) -> Result<bool> {
        let terminal = Self::terminal_action(&self.config.terminal, Arc::clone(&self.power));
        resume_pending(self.properties.as_ref(), &terminal).await
    }

    /// Wait for power signals and run the sequence they ask for.
    ///
    /// `SIGTERM` and `SIGINT` stop watching while no sequence is running.
    /// Signals that arrive during a sequence are absorbed by the guard.
    pub async fn watch(&self) -> Result<Option<SequenceReport>> {
        let mut power = signal(SignalKind::from_raw(libc::SIGPWR))?;
        let mut reboot = signal(SignalKind::user_defined1())?;
        let mut terminate = signal(SignalKind::terminate())?;
        let mut interrupt = signal(SignalKind::interrupt())?;

        info!("Watching for SIGPWR (power off) and SIGUSR1 (reboot)");
        let mut running: Option<JoinHandle<SequenceReport>> = None;

        loop {
            let name = tokio::select! {
                Some(()) = power.recv() => "SIGPWR",
                Some(()) = reboot.recv() => "SIGUSR1",
                Some(()) = terminate.recv() => "SIGTERM",
                Some(()) = interrupt.recv() => "SIGINT",
                joined = Self::join_running(&mut running), if running.is_some() => {
                    return joined.map(Some);
                }
            };

            let Some(request) = request_for_signal(name) else {
                if running.is_some() {
                    warn!("Received {} during shutdown sequence, ignoring", name);
                    continue;
                }
                info!("Received {}, no longer watching", name);
                return Ok(None);
            };

            info!("Received {}, requesting {}", name, request.action());
            if let Some(handle) = self.sequencer.begin_shutdown(request) {
                running = Some(handle);
            }
        }
    }

    /// Wait on the running sequence without giving up the handle
    async fn join_running(
        running: &mut Option<JoinHandle<SequenceReport>>,
    ) -> Result<SequenceReport> {
        match running {
            Some(handle) => handle.await.map_err(Self::task_failed),
            None => std::future::pending().await,
        }
    }

    async fn join(handle: JoinHandle<SequenceReport>) -> Result<SequenceReport> {
        handle.await.map_err(Self::task_failed)
    }

    fn task_failed(e: JoinError) -> PowerdownError {
        PowerdownError::fatal(format!("shutdown sequence task failed: {}", e))
    }
}
