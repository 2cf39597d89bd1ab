use super::contracts::ActivitySupervisor;
use crate::error::{PowerdownError, Result};
use async_trait::async_trait;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::info;

/// Asks the process supervisor to stop managed applications by running a
/// command, e.g. `systemctl stop apps.target`.
pub struct CommandSupervisor {
    program: String,
    args: Vec<String>,
}

impl CommandSupervisor {
    /// Returns `None` for an empty command line
    pub fn from_command_line(command: &[String]) -> Option<Self> {
        let (program, args) = command.split_first()?;
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }
}

#[async_trait]
impl ActivitySupervisor for CommandSupervisor {
    async fn shutdown(&self, budget: Duration) -> Result<()> {
        info!("Running supervisor shutdown command: {} {:?}", self.program, self.args);

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .env("POWERDOWN_TIMEOUT_MS", budget.as_millis().to_string())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| PowerdownError::transport("supervisor", format!("{}: {}", self.program, e)))?;

        let waited = timeout(budget, child.wait()).await;
        match waited {
            Ok(Ok(status)) if status.success() => Ok(()),
            Ok(Ok(status)) => Err(PowerdownError::transport(
                "supervisor",
                format!("{} exited with {}", self.program, status),
            )),
            Ok(Err(e)) => Err(PowerdownError::transport("supervisor", e.to_string())),
            Err(_) => {
                let _ = child.kill().await;
                Err(PowerdownError::timeout("supervisor shutdown", budget))
            }
        }
    }
}
