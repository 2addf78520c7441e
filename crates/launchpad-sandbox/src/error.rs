//! Sandbox error types

use launchpad_core::{CommandError, OrchestratorError};
use std::time::Duration;

/// Faults raised by sandbox backends and their command adapters
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    /// Command could not be started
    #[error("failed to spawn `{program}`: {reason}")]
    Spawn { program: String, reason: String },

    /// Command exceeded its time budget
    #[error("`{step}` timed out after {}s", .after.as_secs())]
    Timeout { step: String, after: Duration },

    /// Image build failed
    #[error("image build failed: {0}")]
    Build(String),

    /// Container or CLI step exited unsuccessfully
    #[error("`{step}` exited with status {status}: {output}")]
    Step {
        step: String,
        status: i32,
        output: String,
    },

    /// Scratch directory could not be prepared
    #[error("scratch directory: {0}")]
    Io(#[from] std::io::Error),

    /// Resource removal failed
    #[error("teardown failed: {0}")]
    Teardown(String),
}

impl SandboxError {
    /// Check if the failure may clear on retry
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Spawn { .. })
    }
}

impl From<CommandError> for SandboxError {
    fn from(err: CommandError) -> Self {
        match err {
            CommandError::Spawn { program, reason } => Self::Spawn { program, reason },
            CommandError::Timeout { step, after } => Self::Timeout { step, after },
        }
    }
}

impl From<SandboxError> for OrchestratorError {
    fn from(err: SandboxError) -> Self {
        OrchestratorError::SandboxFailure(err.to_string())
    }
}
