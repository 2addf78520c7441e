//! Unified authentication router
//!
//! Owns every session mutation. Picks the identity driver from the user's
//! deployment preference and records each flow step in the session store.

use crate::driver::{AuthChallenge, AuthEvidence, AuthOutcome, AuthResult, IdentityDriver};
use crate::state::validate_transition;
use crate::store::SessionStore;
use launchpad_core::{
    AuthState, AuthType, DeploymentPreference, DeploymentSession, OrchestratorError, SessionId,
};
use serde::Serialize;
use std::sync::Arc;

/// One entry of the options menu
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlowOption {
    pub preference: DeploymentPreference,
    pub title: String,
    pub description: String,
    /// Action tag the client sends back
    pub action: String,
}

/// Choices offered when the caller has not picked a deployment option
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OptionsMenu {
    pub message: String,
    pub options: Vec<FlowOption>,
}

impl OptionsMenu {
    /// The two deployment options, one per identity flow
    #[must_use]
    pub fn standard() -> Self {
        Self {
            message: "Choose how you'd like to deploy your agent".into(),
            options: vec![
                FlowOption {
                    preference: DeploymentPreference::UserAccount,
                    title: "Deploy to My Cloud Account".into(),
                    description: "Sign in with your organization's single sign-on and deploy into your own account".into(),
                    action: "device_code_login".into(),
                },
                FlowOption {
                    preference: DeploymentPreference::ManagedTenant,
                    title: "Use Managed Deployment".into(),
                    description: "Sign in with your email and deploy into an isolated managed environment".into(),
                    action: "hosted_login".into(),
                },
            ],
        }
    }
}

/// Result of `begin_auth`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BeginAuthResponse {
    Challenge { challenge: AuthChallenge },
    Options { menu: OptionsMenu },
}

/// Session-owning front door for both identity flows
#[derive(Clone)]
pub struct AuthRouter {
    store: Arc<dyn SessionStore>,
    device: Arc<dyn IdentityDriver>,
    hosted: Arc<dyn IdentityDriver>,
}

impl AuthRouter {
    #[must_use]
    pub fn new(
        store: Arc<dyn SessionStore>,
        device: Arc<dyn IdentityDriver>,
        hosted: Arc<dyn IdentityDriver>,
    ) -> Self {
        Self {
            store,
            device,
            hosted,
        }
    }

    /// Fresh random session id
    #[inline]
    #[must_use]
    pub fn generate_session_id() -> SessionId {
        SessionId::generate()
    }

    fn driver(&self, auth_type: AuthType) -> &Arc<dyn IdentityDriver> {
        match auth_type {
            AuthType::DeviceCode => &self.device,
            AuthType::AuthCode => &self.hosted,
        }
    }

    /// Start authentication, or list the options when no preference is given
    ///
    /// # Errors
    /// - `InvalidTransition` if the session is already authenticated or failed
    /// - `AuthFailed` if the driver cannot issue a challenge; the session is
    ///   left as it was
    #[tracing::instrument(skip(self), fields(session = %session_id))]
    pub async fn begin_auth(
        &self,
        session_id: &SessionId,
        preference: Option<DeploymentPreference>,
    ) -> Result<BeginAuthResponse, OrchestratorError> {
        let Some(preference) = preference else {
            return Ok(BeginAuthResponse::Options {
                menu: OptionsMenu::standard(),
            });
        };

        let mut session = self
            .store
            .get(session_id)
            .await
            .unwrap_or_else(|| DeploymentSession::new(session_id.clone()));
        validate_transition(session.auth_state, AuthState::Pending)?;

        let auth_type = preference.auth_type();
        let issued = self.driver(auth_type).begin(session_id).await.map_err(|failure| {
            tracing::warn!(error = %failure, %auth_type, "identity driver could not start");
            OrchestratorError::AuthFailed(failure.0)
        })?;

        session.mark_pending(auth_type, issued.pending);
        self.store.put(session).await;
        tracing::info!(%auth_type, "authentication started");

        Ok(BeginAuthResponse::Challenge {
            challenge: issued.challenge,
        })
    }

    /// Feed evidence into the session's flow
    ///
    /// Polling an authenticated session returns the stored result again.
    ///
    /// # Errors
    /// - `SessionNotFound` for an unknown session
    /// - `AuthTypeMismatch` if `auth_type` is not the flow in progress
    /// - `AuthFailed` if the session already failed
    /// - `InvalidTransition` if no flow was started
    #[tracing::instrument(skip(self, evidence), fields(session = %session_id))]
    pub async fn complete_auth(
        &self,
        session_id: &SessionId,
        evidence: &AuthEvidence,
        auth_type: AuthType,
    ) -> Result<AuthOutcome, OrchestratorError> {
        let mut session = self.session(session_id).await?;

        if let Some(expected) = session.auth_type {
            if expected != auth_type {
                return Err(OrchestratorError::AuthTypeMismatch {
                    expected,
                    actual: auth_type,
                });
            }
        }

        match session.auth_state {
            AuthState::Authenticated => {
                return match (session.credentials, session.principal) {
                    (Some(credentials), Some(principal)) => {
                        Ok(AuthOutcome::Authenticated(AuthResult {
                            credentials,
                            principal,
                        }))
                    }
                    _ => Err(OrchestratorError::AuthFailed(
                        "authenticated session has no stored identity".into(),
                    )),
                };
            }
            AuthState::Failed => {
                return Err(OrchestratorError::AuthFailed(
                    session.failure.unwrap_or_else(|| "authentication failed".into()),
                ));
            }
            AuthState::Unauthenticated => {
                return Err(OrchestratorError::InvalidTransition {
                    from: AuthState::Unauthenticated,
                    to: AuthState::Authenticated,
                });
            }
            AuthState::Pending => {}
        }

        let outcome = self.driver(auth_type).complete(&session, evidence).await;
        match &outcome {
            AuthOutcome::Authenticated(result) => {
                validate_transition(session.auth_state, AuthState::Authenticated)?;
                session.mark_authenticated(result.credentials.clone(), result.principal.clone());
                self.store.put(session).await;
                tracing::info!(user = %result.principal.user_id, "session authenticated");
            }
            AuthOutcome::Failed(reason) => {
                validate_transition(session.auth_state, AuthState::Failed)?;
                session.mark_failed(reason.clone());
                self.store.put(session).await;
                tracing::warn!(%reason, "authentication failed");
            }
            AuthOutcome::Pending => {}
        }
        Ok(outcome)
    }

    /// Snapshot of a session
    ///
    /// # Errors
    /// `SessionNotFound` for an unknown session
    pub async fn session(
        &self,
        session_id: &SessionId,
    ) -> Result<DeploymentSession, OrchestratorError> {
        self.store
            .get(session_id)
            .await
            .ok_or_else(|| OrchestratorError::SessionNotFound(session_id.clone()))
    }

    /// Drop all auth data and return the session to `Unauthenticated`
    ///
    /// # Errors
    /// - `SessionNotFound` for an unknown session
    /// - `InvalidTransition` for an authenticated session
    #[tracing::instrument(skip(self), fields(session = %session_id))]
    pub async fn reset(
        &self,
        session_id: &SessionId,
    ) -> Result<DeploymentSession, OrchestratorError> {
        let mut session = self.session(session_id).await?;
        if session.auth_state != AuthState::Unauthenticated {
            validate_transition(session.auth_state, AuthState::Unauthenticated)?;
            session.reset();
            self.store.put(session.clone()).await;
            tracing::info!("session reset");
        }
        Ok(session)
    }
}
