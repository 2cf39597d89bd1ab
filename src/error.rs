use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PowerdownError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    /// Collaborator service is not present
    #[error("{service} is unreachable")]
    Unreachable { service: String },

    /// Phase deadline or poll bound exhausted
    #[error("{operation} timed out after {elapsed:?}")]
    Timeout {
        operation: String,
        elapsed: Duration,
    },

    /// RPC-level failure talking to a collaborator
    #[error("Transport error from {service}: {message}")]
    Transport { service: String, message: String },

    /// The terminal power action itself failed
    #[error("Fatal power error: {message}")]
    Fatal { message: String },

    #[error("Property store error for '{key}': {message}")]
    Property { key: String, message: String },
}

impl PowerdownError {
    pub fn unreachable<S: Into<String>>(service: S) -> Self {
        Self::Unreachable {
            service: service.into(),
        }
    }

    pub fn transport<S: Into<String>, M: Into<String>>(service: S, message: M) -> Self {
        Self::Transport {
            service: service.into(),
            message: message.into(),
        }
    }

    pub fn timeout<S: Into<String>>(operation: S, elapsed: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed,
        }
    }

    pub fn fatal<S: Into<String>>(message: S) -> Self {
        Self::Fatal {
            message: message.into(),
        }
    }

    pub fn property<K: Into<String>, M: Into<String>>(key: K, message: M) -> Self {
        Self::Property {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Errors after which the sequencer assumes the subsystem is already
    /// quiesced and moves on.
    pub fn is_fail_open(&self) -> bool {
        matches!(
            self,
            PowerdownError::Unreachable { .. }
                | PowerdownError::Transport { .. }
                | PowerdownError::Io(_)
        )
    }
}

/// Event bus errors
#[derive(Error, Debug, Clone)]
pub enum EventBusError {
    #[error("Failed to publish event: {details}")]
    PublishFailed { details: String },
}

pub type Result<T> = std::result::Result<T, PowerdownError>;
