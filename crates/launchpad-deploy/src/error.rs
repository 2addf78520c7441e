//! Provisioning error types

use launchpad_core::{CommandError, OrchestratorError};
use std::time::Duration;

/// Faults from the runtime control plane and role delegation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProvisionError {
    /// Delegated role could not be assumed
    #[error("assume role failed: {0}")]
    AssumeRole(String),

    /// User credentials expired before delegation
    #[error("session credentials have expired")]
    ExpiredCredentials,

    /// Control plane rejected the request
    #[error("provider error: {0}")]
    Provider(String),

    /// CLI could not be started
    #[error("failed to run `{program}`: {reason}")]
    Spawn { program: String, reason: String },

    /// CLI exceeded its time budget
    #[error("`{step}` timed out after {}s", .after.as_secs())]
    Timeout { step: String, after: Duration },

    /// Response could not be decoded
    #[error("unexpected provider response: {0}")]
    Decode(String),

    /// Inputs cannot form a valid request
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl ProvisionError {
    /// Check if the same request may succeed later
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Spawn { .. })
    }
}

impl From<ProvisionError> for OrchestratorError {
    fn from(err: ProvisionError) -> Self {
        OrchestratorError::DeploymentFailure(err.to_string())
    }
}

impl From<CommandError> for ProvisionError {
    fn from(err: CommandError) -> Self {
        match err {
            CommandError::Spawn { program, reason } => Self::Spawn { program, reason },
            CommandError::Timeout { step, after } => Self::Timeout { step, after },
        }
    }
}
