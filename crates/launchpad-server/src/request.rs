//! Inbound requests
//!
//! One JSON object per request, tagged by `action`. Field aliases accept the
//! payload names older front ends send (`deploy_agent`, `test_prompt`,
//! `deployment_type`, `deployment_target`).

use launchpad_auth::AuthEvidence;
use launchpad_core::{AgentDescriptor, AuthType, DeploymentPreference, DeploymentTarget, SessionId};
use serde::Deserialize;
use serde_json::{Map, Value};

/// Every action the orchestrator serves
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Request {
    /// Build a descriptor from raw user input
    CreateAgent {
        #[serde(alias = "agentConfig")]
        agent_config: Map<String, Value>,
    },

    /// Run a descriptor once in its sandbox
    TestAgent {
        #[serde(alias = "agent_config")]
        agent: AgentDescriptor,
        #[serde(alias = "test_prompt")]
        prompt: String,
    },

    /// Start authentication, or list the options
    #[serde(alias = "deploy_agent")]
    Deploy {
        #[serde(default)]
        session_id: Option<SessionId>,
        #[serde(default, alias = "deployment_type")]
        preference: Option<DeploymentPreference>,
    },

    /// Feed challenge evidence (poll or redirect callback)
    AuthCallback {
        session_id: SessionId,
        #[serde(default)]
        evidence: AuthEvidence,
        auth_type: AuthType,
    },

    /// Create the production runtime
    ExecuteDeployment {
        #[serde(default)]
        session_id: Option<SessionId>,
        #[serde(alias = "agent_config")]
        agent: AgentDescriptor,
        #[serde(alias = "deployment_target")]
        target: DeploymentTarget,
    },

    /// Read a session's state
    SessionStatus { session_id: SessionId },

    /// Drop a session's auth data
    ResetSession { session_id: SessionId },
}

impl Request {
    /// Canonical action name echoed in the response envelope
    #[must_use]
    pub fn action(&self) -> &'static str {
        match self {
            Self::CreateAgent { .. } => "create_agent",
            Self::TestAgent { .. } => "test_agent",
            Self::Deploy { .. } => "deploy",
            Self::AuthCallback { .. } => "auth_callback",
            Self::ExecuteDeployment { .. } => "execute_deployment",
            Self::SessionStatus { .. } => "session_status",
            Self::ResetSession { .. } => "reset_session",
        }
    }
}
