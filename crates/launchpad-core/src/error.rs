//! Error types for Launchpad
//!
//! Every component boundary converts provider and transport faults into one
//! of these variants:
//! - Caller mistakes (bad config, unknown model family, ordering bugs)
//! - Sandbox, authentication and deployment failures
//! - Session lookup and state machine violations

use crate::types::{AuthState, AuthType, SessionId};

/// Result alias used across the workspace
pub type Result<T, E = OrchestratorError> = std::result::Result<T, E>;

/// Main orchestrator error type
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OrchestratorError {
    /// Raw agent input is missing or malformed
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// Descriptor names a model family no sandbox backend serves
    #[error("unsupported model type: {0}")]
    UnsupportedModelType(String),

    /// Sandbox build, run or invoke failed
    #[error("sandbox failure: {0}")]
    SandboxFailure(String),

    /// Device authorization has not been completed yet
    #[error("authorization pending")]
    AuthPending,

    /// Identity flow failed; the session must be restarted
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// Deployment requested without an authenticated session
    #[error(
        "deployment requires an authenticated session{}",
        .session_id
            .as_ref()
            .map(|id| format!(" (session {id} is not authenticated)"))
            .unwrap_or_default()
    )]
    NotAuthenticated { session_id: Option<SessionId> },

    /// Provider-side failure during runtime creation
    #[error("deployment failed: {0}")]
    DeploymentFailure(String),

    /// No session is stored under this id
    #[error("session not found: {0}")]
    SessionNotFound(SessionId),

    /// Session state machine rejected the transition
    #[error("illegal session transition: {from} -> {to}")]
    InvalidTransition { from: AuthState, to: AuthState },

    /// Callback names a different flow than the one in progress
    #[error("auth type mismatch: session uses {expected}, callback sent {actual}")]
    AuthTypeMismatch { expected: AuthType, actual: AuthType },

    /// Orchestrator configuration is unusable
    #[error("configuration error: {0}")]
    Config(String),
}

impl OrchestratorError {
    /// Stable machine-readable code used in response envelopes
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig(_) => "invalid_config",
            Self::UnsupportedModelType(_) => "unsupported_model_type",
            Self::SandboxFailure(_) => "sandbox_failure",
            Self::AuthPending => "auth_pending",
            Self::AuthFailed(_) => "auth_failed",
            Self::NotAuthenticated { .. } => "not_authenticated",
            Self::DeploymentFailure(_) => "deployment_failure",
            Self::SessionNotFound(_) => "session_not_found",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::AuthTypeMismatch { .. } => "auth_type_mismatch",
            Self::Config(_) => "config_error",
        }
    }

    /// Check if the same call may succeed when repeated later
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::AuthPending | Self::SandboxFailure(_) | Self::DeploymentFailure(_)
        )
    }

    /// Check if the error stems from the caller's input or call ordering
    #[inline]
    #[must_use]
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidConfig(_)
                | Self::UnsupportedModelType(_)
                | Self::NotAuthenticated { .. }
                | Self::SessionNotFound(_)
                | Self::InvalidTransition { .. }
                | Self::AuthTypeMismatch { .. }
        )
    }

    /// Shorthand for a missing or malformed input field
    #[inline]
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }
}
