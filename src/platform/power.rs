use crate::error::Result;
use tracing::info;

/// Low-level power primitives. Successful calls on real hardware do not return.
pub trait PowerControl: Send + Sync {
    fn reboot(&self, reason: Option<&str>) -> Result<()>;

    fn power_off(&self) -> Result<()>;
}

/// Power control through reboot(2)
#[cfg(target_os = "linux")]
#[derive(Debug, Default)]
pub struct KernelPowerControl;

#[cfg(target_os = "linux")]
impl KernelPowerControl {
    pub fn new() -> Self {
        Self
    }

    fn check(rc: i64, what: &str) -> Result<()> {
        if rc < 0 {
            return Err(crate::error::PowerdownError::fatal(format!(
                "{} failed: {}",
                what,
                std::io::Error::last_os_error()
            )));
        }
        Ok(())
    }
}

#[cfg(target_os = "linux")]
impl PowerControl for KernelPowerControl {
    fn reboot(&self, reason: Option<&str>) -> Result<()> {
        unsafe { libc::sync() };

        let rc = match reason {
            Some(reason) => {
                let arg = std::ffi::CString::new(reason).map_err(|_| {
                    crate::error::PowerdownError::fatal("reboot reason contains a NUL byte")
                })?;
                unsafe {
                    libc::syscall(
                        libc::SYS_reboot,
                        libc::LINUX_REBOOT_MAGIC1,
                        libc::LINUX_REBOOT_MAGIC2,
                        libc::LINUX_REBOOT_CMD_RESTART2,
                        arg.as_ptr(),
                    ) as i64
                }
            }
            None => unsafe { libc::reboot(libc::RB_AUTOBOOT) as i64 },
        };
        Self::check(rc, "reboot(2)")
    }

    fn power_off(&self) -> Result<()> {
        unsafe { libc::sync() };
        let rc = unsafe { libc::reboot(libc::RB_POWER_OFF) as i64 };
        Self::check(rc, "power off")
    }
}

/// Logs the power action instead of performing it
#[derive(Debug, Default)]
pub struct LoggingPowerControl;

impl PowerControl for LoggingPowerControl {
    fn reboot(&self, reason: Option<&str>) -> Result<()> {
        info!("[dry run] reboot, reason: {}", reason.unwrap_or("none"));
        Ok(())
    }

    fn power_off(&self) -> Result<()> {
        info!("[dry run] power off");
        Ok(())
    }
}
