use super::contracts::{CellularRadio, PollTarget, ShortRangeRadio};
use crate::error::{PowerdownError, Result};
use crate::sequencer::SubsystemStatus;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Ask every cellular instance that is still on to turn off.
///
/// Returns `true` when every instance was already off.
pub async fn request_cellular_off(radio: &dyn CellularRadio) -> Result<bool> {
    let count = radio.instance_count().await?;
    let mut all_off = true;

    for instance in 0..count {
        if radio.is_radio_on(instance).await? {
            all_off = false;
            warn!("Turning off radio on instance {}", instance);
            radio.set_radio_off(instance).await?;
        }
    }

    Ok(all_off)
}

/// Disable the short-range radio unless it already reports off.
///
/// Returns `true` when it was already off.
pub async fn request_short_range_off(radio: &dyn ShortRangeRadio) -> Result<bool> {
    if radio.state().await?.is_off() {
        return Ok(true);
    }

    warn!("Disabling short-range radio...");
    radio.disable().await?;
    Ok(false)
}

/// Off only when every instance is off
pub struct CellularProbe {
    radio: Arc<dyn CellularRadio>,
}

impl CellularProbe {
    pub fn new(radio: Arc<dyn CellularRadio>) -> Self {
        Self { radio }
    }
}

#[async_trait]
impl PollTarget for CellularProbe {
    fn name(&self) -> &str {
        "cellular radio"
    }

    async fn is_off(&self) -> Result<bool> {
        let count = self.radio.instance_count().await?;
        for instance in 0..count {
            if self.radio.is_radio_on(instance).await? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

pub struct ShortRangeProbe {
    radio: Arc<dyn ShortRangeRadio>,
}

impl ShortRangeProbe {
    pub fn new(radio: Arc<dyn ShortRangeRadio>) -> Self {
        Self { radio }
    }
}

#[async_trait]
impl PollTarget for ShortRangeProbe {
    fn name(&self) -> &str {
        "short-range radio"
    }

    async fn is_off(&self) -> Result<bool> {
        Ok(self.radio.state().await?.is_off())
    }
}

/// Radio controlled through the Linux rfkill class.
///
/// Every rfkill entry of the configured type is one instance. An entry is on
/// while its `state` reads `1` (unblocked); writing `1` to `soft` blocks it.
pub struct RfkillRadio {
    root: PathBuf,
    kind: String,
}

impl RfkillRadio {
    pub fn new<P: AsRef<Path>, S: Into<String>>(root: P, kind: S) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            kind: kind.into(),
        }
    }

    /// rfkill entries of this radio's type, sorted by name
    async fn entries(&self) -> Result<Vec<PathBuf>> {
        let mut dir = tokio::fs::read_dir(&self.root).await.map_err(|e| {
            PowerdownError::transport(
                format!("rfkill {}", self.kind),
                format!("{}: {}", self.root.display(), e),
            )
        })?;

        let mut entries = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            match tokio::fs::read_to_string(path.join("type")).await {
                Ok(kind) if kind.trim() == self.kind => entries.push(path),
                Ok(_) => {}
                Err(e) => debug!("Skipping rfkill entry {}: {}", path.display(), e),
            }
        }
        entries.sort();
        Ok(entries)
    }

    async fn entry(&self, instance: usize) -> Result<PathBuf> {
        self.entries().await?.into_iter().nth(instance).ok_or_else(|| {
            PowerdownError::unreachable(format!("rfkill {} instance {}", self.kind, instance))
        })
    }

    async fn entry_is_on(entry: &Path) -> Result<bool> {
        let state = tokio::fs::read_to_string(entry.join("state")).await?;
        Ok(state.trim() == "1")
    }

    async fn block(&self, entry: &Path) -> Result<()> {
        tokio::fs::write(entry.join("soft"), "1").await.map_err(|e| {
            PowerdownError::transport(
                format!("rfkill {}", self.kind),
                format!("cannot block {}: {}", entry.display(), e),
            )
        })
    }
}

#[async_trait]
impl CellularRadio for RfkillRadio {
    async fn instance_count(&self) -> Result<usize> {
        Ok(self.entries().await?.len())
    }

    async fn is_radio_on(&self, instance: usize) -> Result<bool> {
        Self::entry_is_on(&self.entry(instance).await?).await
    }

    async fn set_radio_off(&self, instance: usize) -> Result<()> {
        let entry = self.entry(instance).await?;
        self.block(&entry).await
    }
}

#[async_trait]
impl ShortRangeRadio for RfkillRadio {
    async fn state(&self) -> Result<SubsystemStatus> {
        let entries = self.entries().await?;
        if entries.is_empty() {
            return Err(PowerdownError::unreachable(format!("rfkill {}", self.kind)));
        }

        for entry in &entries {
            if Self::entry_is_on(entry).await? {
                return Ok(SubsystemStatus::On);
            }
        }
        Ok(SubsystemStatus::Off)
    }

    async fn disable(&self) -> Result<()> {
        for entry in self.entries().await? {
            if Self::entry_is_on(&entry).await? {
                self.block(&entry).await?;
            }
        }
        Ok(())
    }
}
