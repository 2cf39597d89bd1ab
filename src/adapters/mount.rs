use super::contracts::MountManager;
use crate::error::Result;
use crate::sequencer::CompletionHandle;
use async_trait::async_trait;
use std::ffi::CString;
use std::os::unix::ffi::OsStrExt;
use std::path::PathBuf;
use tracing::{info, warn};

/// Flushes dirty pages and detaches the configured mount points on a
/// blocking thread, then reports the number of failed unmounts.
pub struct SyncingMountManager {
    mount_points: Vec<PathBuf>,
}

impl SyncingMountManager {
    pub fn new<I, P>(mount_points: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            mount_points: mount_points.into_iter().map(Into::into).collect(),
        }
    }

    fn release(mount_points: &[PathBuf]) -> i32 {
        unsafe { libc::sync() };

        let mut failures = 0;
        for mount_point in mount_points {
            let path = match CString::new(mount_point.as_os_str().as_bytes()) {
                Ok(path) => path,
                Err(_) => {
                    warn!("Skipping mount point with NUL byte: {}", mount_point.display());
                    failures += 1;
                    continue;
                }
            };

            let rc = unsafe { libc::umount2(path.as_ptr(), libc::MNT_DETACH) };
            if rc != 0 {
                failures += 1;
                warn!(
                    "Failed to unmount {}: {}",
                    mount_point.display(),
                    std::io::Error::last_os_error()
                );
            } else {
                info!("Unmounted {}", mount_point.display());
            }
        }
        failures
    }
}

#[async_trait]
impl MountManager for SyncingMountManager {
    async fn shutdown(&self, on_done: CompletionHandle) -> Result<()> {
        let mount_points = self.mount_points.clone();
        tokio::task::spawn_blocking(move || {
            let failures = Self::release(&mount_points);
            on_done.done(failures);
        });
        Ok(())
    }
}
