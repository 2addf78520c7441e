//! Request handler
//!
//! Maps each [`Request`] onto the phase that serves it and wraps the result
//! in an [`Envelope`]. Tokens and client secrets never leave through here.

use crate::envelope::Envelope;
use crate::request::Request;
use chrono::{DateTime, Utc};
use launchpad_auth::{AuthEvidence, AuthOutcome, AuthRouter, BeginAuthResponse};
use launchpad_core::{
    AgentConfigBuilder, AgentDescriptor, AuthState, AuthType, DeploymentPreference,
    DeploymentSession, DeploymentTarget, OrchestratorError, Principal, SessionId, TestOutcome,
};
use launchpad_deploy::DeploymentExecutor;
use launchpad_sandbox::SandboxDispatcher;
use serde::Serialize;
use serde_json::{Map, Value};

/// Test outcome plus the promotion hint
#[derive(Debug, Serialize)]
struct TestReport<'a> {
    #[serde(flatten)]
    outcome: &'a TestOutcome,
    ready_for_deployment: bool,
}

/// `deploy` response body
#[derive(Debug, Serialize)]
struct DeployStarted<'a> {
    session_id: &'a SessionId,
    #[serde(flatten)]
    response: &'a BeginAuthResponse,
}

/// Caller-facing view of an [`AuthOutcome`]
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum OutcomeView<'a> {
    Authenticated {
        principal: &'a Principal,
        #[serde(skip_serializing_if = "Option::is_none")]
        expires_at: Option<DateTime<Utc>>,
    },
    Pending,
    Failed {
        reason: &'a str,
    },
}

/// Caller-facing view of a session, without credentials or pending secrets
#[derive(Debug, Serialize)]
pub struct SessionView<'a> {
    pub session_id: &'a SessionId,
    pub auth_state: AuthState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_type: Option<AuthType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub principal: Option<&'a Principal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<&'a str>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl<'a> From<&'a DeploymentSession> for SessionView<'a> {
    fn from(session: &'a DeploymentSession) -> Self {
        Self {
            session_id: &session.session_id,
            auth_state: session.auth_state,
            auth_type: session.auth_type,
            principal: session.principal.as_ref(),
            expires_at: session.credentials.as_ref().and_then(|c| c.expires_at),
            failure: session.failure.as_deref(),
            created_at: session.created_at,
            updated_at: session.updated_at,
        }
    }
}

/// Entry point for every action
#[derive(Clone)]
pub struct RequestHandler {
    builder: AgentConfigBuilder,
    sandbox: SandboxDispatcher,
    auth: AuthRouter,
    executor: std::sync::Arc<DeploymentExecutor>,
}

impl RequestHandler {
    #[must_use]
    pub fn new(sandbox: SandboxDispatcher, auth: AuthRouter, executor: DeploymentExecutor) -> Self {
        Self {
            builder: AgentConfigBuilder::new(),
            sandbox,
            auth,
            executor: std::sync::Arc::new(executor),
        }
    }

    /// Parse one JSON request and handle it; malformed input gets an
    /// `invalid_config` envelope
    pub async fn handle_json(&self, raw: &str) -> Envelope {
        match serde_json::from_str::<Request>(raw) {
            Ok(request) => self.handle(request).await,
            Err(err) => {
                let action = serde_json::from_str::<Value>(raw)
                    .ok()
                    .and_then(|v| v.get("action").and_then(Value::as_str).map(str::to_owned))
                    .unwrap_or_else(|| "unknown".to_string());
                tracing::warn!(error = %err, %action, "rejecting malformed request");
                Envelope::failure(
                    action,
                    &OrchestratorError::invalid_config(format!("malformed request: {err}")),
                )
            }
        }
    }

    /// Serve one request
    #[tracing::instrument(skip_all, fields(action = request.action()))]
    pub async fn handle(&self, request: Request) -> Envelope {
        let action = request.action();
        let result = match request {
            Request::CreateAgent { agent_config } => self.create_agent(&agent_config),
            Request::TestAgent { agent, prompt } => self.test_agent(&agent, &prompt).await,
            Request::Deploy {
                session_id,
                preference,
            } => self.deploy(session_id, preference).await,
            Request::AuthCallback {
                session_id,
                evidence,
                auth_type,
            } => self.auth_callback(&session_id, &evidence, auth_type).await,
            Request::ExecuteDeployment {
                session_id,
                agent,
                target,
            } => self.execute_deployment(session_id, &agent, &target).await,
            Request::SessionStatus { session_id } => self
                .auth
                .session(&session_id)
                .await
                .map(|session| session_envelope(action, "Session state", &session)),
            Request::ResetSession { session_id } => self
                .auth
                .reset(&session_id)
                .await
                .map(|session| session_envelope(action, "Session reset", &session)),
        };
        result.unwrap_or_else(|err| {
            if err.is_caller_error() {
                tracing::debug!(error = %err, "request rejected");
            } else {
                tracing::warn!(error = %err, "request failed");
            }
            Envelope::failure(action, &err)
        })
    }

    fn create_agent(&self, raw: &Map<String, Value>) -> Result<Envelope, OrchestratorError> {
        let agent = self.builder.build(raw)?;
        tracing::info!(agent = %agent.name, owner = %agent.owner_id, "agent descriptor created");
        Ok(Envelope::ok(
            "create_agent",
            format!("Agent '{}' created", agent.name),
        )
        .with_data(&agent)
        .with_next_steps(["test_agent", "deploy"]))
    }

    async fn test_agent(
        &self,
        agent: &AgentDescriptor,
        prompt: &str,
    ) -> Result<Envelope, OrchestratorError> {
        let outcome = self.sandbox.test(agent, prompt).await?;
        let report = TestReport {
            outcome: &outcome,
            ready_for_deployment: outcome.success,
        };
        if outcome.success {
            return Ok(Envelope::ok("test_agent", "Agent test completed")
                .with_data(&report)
                .with_next_steps(["deploy"]));
        }
        let reason = outcome.error.clone().unwrap_or_else(|| "sandbox run failed".into());
        Ok(Envelope::ok(
            "test_agent",
            "Agent test failed; check the model configuration and system prompt",
        )
        .with_data(&report)
        .with_error(&OrchestratorError::SandboxFailure(reason))
        .with_next_steps(["test_agent"]))
    }

    async fn deploy(
        &self,
        session_id: Option<SessionId>,
        preference: Option<DeploymentPreference>,
    ) -> Result<Envelope, OrchestratorError> {
        let session_id = session_id.unwrap_or_else(AuthRouter::generate_session_id);
        let response = self.auth.begin_auth(&session_id, preference).await?;
        let (message, next) = match &response {
            BeginAuthResponse::Options { menu } => (menu.message.clone(), "deploy"),
            BeginAuthResponse::Challenge { .. } => {
                ("Complete sign-in to continue".to_string(), "auth_callback")
            }
        };
        Ok(Envelope::ok("deploy", message)
            .with_data(&DeployStarted {
                session_id: &session_id,
                response: &response,
            })
            .with_next_steps([next]))
    }

    async fn auth_callback(
        &self,
        session_id: &SessionId,
        evidence: &AuthEvidence,
        auth_type: AuthType,
    ) -> Result<Envelope, OrchestratorError> {
        let outcome = self.auth.complete_auth(session_id, evidence, auth_type).await?;
        let envelope = match &outcome {
            AuthOutcome::Authenticated(result) => Envelope::ok("auth_callback", "Authenticated")
                .with_data(&OutcomeView::Authenticated {
                    principal: &result.principal,
                    expires_at: result.credentials.expires_at,
                })
                .with_next_steps(["execute_deployment"]),
            AuthOutcome::Pending => {
                Envelope::ok("auth_callback", "Authorization pending; poll again")
                    .with_data(&OutcomeView::Pending)
                    .with_error(&OrchestratorError::AuthPending)
                    .with_next_steps(["auth_callback"])
            }
            AuthOutcome::Failed(reason) => Envelope::ok("auth_callback", "Authentication failed")
                .with_data(&OutcomeView::Failed { reason })
                .with_error(&OrchestratorError::AuthFailed(reason.clone()))
                .with_next_steps(["reset_session"]),
        };
        Ok(envelope)
    }

    async fn execute_deployment(
        &self,
        session_id: Option<SessionId>,
        agent: &AgentDescriptor,
        target: &DeploymentTarget,
    ) -> Result<Envelope, OrchestratorError> {
        let session = match session_id {
            Some(id) => match self.auth.session(&id).await {
                Ok(session) => Some(session),
                // Unknown ids deploy as unauthenticated so the error names them
                Err(OrchestratorError::SessionNotFound(_)) => Some(DeploymentSession::new(id)),
                Err(err) => return Err(err),
            },
            None => None,
        };
        let result = self.executor.deploy(session.as_ref(), agent, target).await?;
        let envelope =
            Envelope::ok("execute_deployment", result.message.clone()).with_data(&result);
        Ok(match &result.error {
            Some(reason) if !result.success => {
                envelope.with_error(&OrchestratorError::DeploymentFailure(reason.clone()))
            }
            _ => envelope,
        })
    }
}

fn session_envelope(action: &str, message: &str, session: &DeploymentSession) -> Envelope {
    Envelope::ok(action, message).with_data(&SessionView::from(session))
}
