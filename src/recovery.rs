use crate::error::{PowerdownError, Result};
use crate::platform::{PropertyStore, SHUTDOWN_ACTION_PROPERTY};
use crate::sequencer::{ShutdownRequest, TerminalAction};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkerAction {
    Reboot,
    Shutdown,
}

/// Persisted form of a [`ShutdownRequest`], written before any subsystem is
/// touched so a restarted process can finish the job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShutdownMarker {
    pub action: MarkerAction,
    pub reason: Option<String>,
    pub requested_at: Option<DateTime<Utc>>,
    pub sequence_id: Option<Uuid>,
}

impl ShutdownMarker {
    pub fn new(request: &ShutdownRequest, sequence_id: Uuid) -> Self {
        Self {
            action: if request.is_reboot {
                MarkerAction::Reboot
            } else {
                MarkerAction::Shutdown
            },
            reason: request.reason.clone(),
            requested_at: Some(Utc::now()),
            sequence_id: Some(sequence_id),
        }
    }

    pub fn to_request(&self) -> ShutdownRequest {
        ShutdownRequest {
            is_reboot: self.action == MarkerAction::Reboot,
            reason: self.reason.clone(),
        }
    }

    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a stored marker.
    ///
    /// Also accepts the compact legacy form: `1` or `0` for reboot or
    /// shutdown, immediately followed by the reason.
    pub fn decode(value: &str) -> Result<Self> {
        let value = value.trim();
        if value.starts_with('{') {
            return Ok(serde_json::from_str(value)?);
        }

        let mut chars = value.chars();
        let action = match chars.next() {
            Some('1') => MarkerAction::Reboot,
            Some('0') => MarkerAction::Shutdown,
            _ => {
                return Err(PowerdownError::property(
                    SHUTDOWN_ACTION_PROPERTY,
                    format!("unrecognised marker '{}'", value),
                ))
            }
        };
        let reason = chars.as_str();

        Ok(Self {
            action,
            reason: (!reason.is_empty()).then(|| reason.to_string()),
            requested_at: None,
            sequence_id: None,
        })
    }
}

pub fn persist_marker(store: &dyn PropertyStore, marker: &ShutdownMarker) -> Result<()> {
    store.set(SHUTDOWN_ACTION_PROPERTY, &marker.encode()?)
}

pub fn read_marker(store: &dyn PropertyStore) -> Result<Option<ShutdownMarker>> {
    match store.get(SHUTDOWN_ACTION_PROPERTY)? {
        Some(value) if !value.trim().is_empty() => Ok(Some(ShutdownMarker::decode(&value)?)),
        _ => Ok(None),
    }
}

/// Finish a sequence interrupted by a restart.
///
/// When a marker is present it is consumed and the terminal action runs
/// straight away with the persisted request; the subsystem phases are not
/// repeated. Returns whether a marker was found.
pub async fn resume_pending(store: &dyn PropertyStore, terminal: &TerminalAction) -> Result<bool> {
    let marker = match read_marker(store) {
        Ok(Some(marker)) => marker,
        Ok(None) => {
            info!("No pending shutdown marker");
            return Ok(false);
        }
        Err(e) => {
            // An unreadable marker must not trigger a power action
            warn!("Ignoring unreadable shutdown marker: {}", e);
            store.remove(SHUTDOWN_ACTION_PROPERTY)?;
            return Ok(false);
        }
    };

    info!(
        "Resuming interrupted {} (requested at {})",
        marker.to_request().action(),
        marker
            .requested_at
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "unknown".to_string())
    );
    // One-shot
    store.remove(SHUTDOWN_ACTION_PROPERTY)?;
    terminal.execute(&marker.to_request()).await;
    Ok(true)
}
