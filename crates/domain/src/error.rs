use thiserror::Error;

/// Core error taxonomy.
///
/// Local errors (validation, not-found, authorization) are never retried
/// automatically. Transport errors (timeout, bridge-unavailable) may be
/// retried by the original caller only - never silently by the core, to
/// avoid duplicate actuation of non-idempotent commands.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Not authorized: {0}")]
    Authorization(String),

    #[error("No healthy bridge for protocol: {0}")]
    BridgeUnavailable(String),

    #[error("Command {0} timed out waiting for acknowledgment")]
    CommandTimeout(String),

    #[error("Command {command_id} failed: {code}: {message}")]
    CommandFailed {
        command_id: String,
        code: String,
        message: String,
    },

    #[error("Invalid device ID: {0}")]
    InvalidDeviceId(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl CoreError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// True for errors the original caller may retry (transport class).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::BridgeUnavailable(_) | Self::CommandTimeout(_) | Self::Storage(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
