use super::contracts::IntentBroadcaster;
use crate::error::{PowerdownError, Result};
use crate::sequencer::{CompletionHandle, ShutdownRequest};
use async_trait::async_trait;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Notifies listeners by running every executable in a hook directory, one
/// after the other in name order. The last hook finishing is the final
/// acknowledgement.
pub struct HookBroadcaster {
    hook_dir: PathBuf,
}

impl HookBroadcaster {
    pub fn new<P: AsRef<Path>>(hook_dir: P) -> Self {
        Self {
            hook_dir: hook_dir.as_ref().to_path_buf(),
        }
    }

    async fn hooks(&self) -> Result<Vec<PathBuf>> {
        let mut dir = tokio::fs::read_dir(&self.hook_dir)
            .await
            .map_err(|_| PowerdownError::unreachable(format!("hook directory {}", self.hook_dir.display())))?;

        let mut hooks = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            let metadata = entry.metadata().await?;
            if metadata.is_file() && metadata.permissions().mode() & 0o111 != 0 {
                hooks.push(entry.path());
            } else {
                debug!("Ignoring non-executable hook {}", entry.path().display());
            }
        }
        hooks.sort();
        Ok(hooks)
    }
}

#[async_trait]
impl IntentBroadcaster for HookBroadcaster {
    async fn broadcast_shutdown(
        &self,
        request: &ShutdownRequest,
        on_done: CompletionHandle,
    ) -> Result<()> {
        let hooks = self.hooks().await?;
        info!("Notifying {} shutdown listener(s)", hooks.len());

        let action = request.action();
        let reason = request.reason.clone().unwrap_or_default();
        tokio::spawn(async move {
            let mut failures = 0;
            for hook in hooks {
                // Listeners cannot veto the shutdown; their exit status is only logged
                match Command::new(&hook)
                    .env("POWERDOWN_ACTION", action)
                    .env("POWERDOWN_REASON", &reason)
                    .kill_on_drop(true)
                    .status()
                    .await
                {
                    Ok(status) if status.success() => debug!("{} acknowledged", hook.display()),
                    Ok(status) => {
                        failures += 1;
                        warn!("Shutdown listener {} exited with {}", hook.display(), status);
                    }
                    Err(e) => {
                        failures += 1;
                        warn!("Shutdown listener {} failed to run: {}", hook.display(), e);
                    }
                }
            }
            on_done.done(failures);
        });

        Ok(())
    }
}
