//! Authorization-code driver (hosted-login flow)

use super::{
    AuthChallenge, AuthEvidence, AuthOutcome, AuthResult, IdentityDriver, IssuedChallenge,
};
use crate::error::{DriverFailure, ExchangeError};
use chrono::Utc;
use launchpad_core::{
    AuthType, Credentials, DeploymentSession, HostedLoginConfig, PendingChallenge, Principal,
    SessionId,
};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

const LOGIN_MESSAGE: &str = "Sign in with your email to deploy to a managed environment";

/// Identity obtained from an authorization code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangedIdentity {
    pub credentials: Credentials,
    pub principal: Principal,
}

/// Code-for-token exchange port
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait CodeExchange: Send + Sync {
    /// Exchange a one-time code; yields the token and the user behind it
    async fn exchange(&self, code: &str) -> Result<ExchangedIdentity, ExchangeError>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "bearer")]
    token_type: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

fn bearer() -> String {
    "Bearer".to_string()
}

#[derive(Debug, Deserialize)]
struct UserInfo {
    sub: String,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<String>,
    error_description: Option<String>,
}

/// HTTP client for the hosted-login token and user-info endpoints
#[derive(Debug, Clone)]
pub struct HostedLoginClient {
    client: Client,
    config: HostedLoginConfig,
}

impl HostedLoginClient {
    /// # Errors
    /// `ExchangeError::Config` if the HTTP client cannot be built
    pub fn new(config: HostedLoginConfig, timeout: Duration) -> Result<Self, ExchangeError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| ExchangeError::Config(err.to_string()))?;
        Ok(Self { client, config })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/oauth2/{path}", self.config.domain.trim_end_matches('/'))
    }
}

#[async_trait::async_trait]
impl CodeExchange for HostedLoginClient {
    async fn exchange(&self, code: &str) -> Result<ExchangedIdentity, ExchangeError> {
        let form = [
            ("grant_type", "authorization_code"),
            ("client_id", self.config.client_id.as_str()),
            ("code", code),
            ("redirect_uri", self.config.redirect_uri.as_str()),
        ];
        let mut request = self.client.post(self.endpoint("token")).form(&form);
        if let Some(secret) = &self.config.client_secret {
            request = request.basic_auth(&self.config.client_id, Some(secret));
        }
        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            let body: ErrorBody = serde_json::from_str(&text).unwrap_or(ErrorBody {
                error: None,
                error_description: Some(text.clone()),
            });
            let detail = body
                .error_description
                .or(body.error.clone())
                .unwrap_or_else(|| "unknown error".into());
            return Err(match (status, body.error.as_deref()) {
                (StatusCode::BAD_REQUEST, Some("invalid_grant")) => {
                    ExchangeError::InvalidGrant(detail)
                }
                _ => {
                    ExchangeError::Provider(format!("token exchange failed ({status}): {detail}"))
                }
            });
        }
        let token: TokenResponse = response.json().await?;

        let response = self
            .client
            .get(self.endpoint("userInfo"))
            .bearer_auth(&token.access_token)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ExchangeError::Provider(format!(
                "user info lookup failed ({})",
                response.status()
            )));
        }
        let info: UserInfo = response.json().await?;

        let credentials =
            Credentials::issued_now(token.access_token, token.token_type, token.expires_in);
        Ok(ExchangedIdentity {
            credentials,
            principal: Principal {
                user_id: info.sub,
                email: info.email,
            },
        })
    }
}

/// Drives the redirect authorization-code flow
pub struct AuthCodeDriver {
    config: HostedLoginConfig,
    exchange: Arc<dyn CodeExchange>,
}

impl AuthCodeDriver {
    #[must_use]
    pub fn new(config: HostedLoginConfig, exchange: Arc<dyn CodeExchange>) -> Self {
        Self { config, exchange }
    }

    /// Login page URL; `state` carries the session id
    ///
    /// # Errors
    /// `DriverFailure` if the configured domain is not a valid URL
    pub fn authorization_url(&self, session_id: &SessionId) -> Result<Url, DriverFailure> {
        let base = format!("{}/oauth2/authorize", self.config.domain.trim_end_matches('/'));
        let scope = self.config.scopes.join(" ");
        Url::parse_with_params(
            &base,
            &[
                ("client_id", self.config.client_id.as_str()),
                ("response_type", "code"),
                ("scope", scope.as_str()),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("state", session_id.as_str()),
            ],
        )
        .map_err(|err| DriverFailure(format!("invalid hosted login domain '{base}': {err}")))
    }
}

#[async_trait::async_trait]
impl IdentityDriver for AuthCodeDriver {
    fn auth_type(&self) -> AuthType {
        AuthType::AuthCode
    }

    #[tracing::instrument(skip(self), fields(session = %session_id))]
    async fn begin(&self, session_id: &SessionId) -> Result<IssuedChallenge, DriverFailure> {
        let url = self.authorization_url(session_id)?;
        Ok(IssuedChallenge {
            challenge: AuthChallenge::AuthCode {
                authorization_url: url.into(),
                message: LOGIN_MESSAGE.to_string(),
            },
            pending: PendingChallenge::Redirect {
                state: session_id.as_str().to_string(),
                issued_at: Utc::now(),
            },
        })
    }

    #[tracing::instrument(skip_all, fields(session = %session.session_id))]
    async fn complete(&self, session: &DeploymentSession, evidence: &AuthEvidence) -> AuthOutcome {
        let Some(code) = evidence.code.as_deref().filter(|c| !c.trim().is_empty()) else {
            return AuthOutcome::Failed("authorization code missing".into());
        };
        let Some(PendingChallenge::Redirect { state, .. }) = &session.pending else {
            return AuthOutcome::Failed("no hosted login in progress".into());
        };
        match evidence.state.as_deref() {
            None => {
                tracing::warn!("redirect returned without state");
                return AuthOutcome::Failed("state missing".into());
            }
            Some(given) if given != state => {
                tracing::warn!("redirect state does not match session");
                return AuthOutcome::Failed("state mismatch".into());
            }
            Some(_) => {}
        }

        match self.exchange.exchange(code).await {
            Ok(identity) => AuthOutcome::Authenticated(AuthResult {
                credentials: identity.credentials,
                principal: identity.principal,
            }),
            Err(err) => {
                tracing::warn!(error = %err, "authorization code exchange failed");
                AuthOutcome::Failed(err.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> HostedLoginConfig {
        HostedLoginConfig {
            domain: "https://auth.example.com/".into(),
            client_id: "client 1".into(),
            client_secret: None,
            scopes: vec!["openid".into(), "email".into()],
            redirect_uri: "https://app.example.com/callback".into(),
        }
    }

    fn pending_session() -> DeploymentSession {
        let mut session = DeploymentSession::new(SessionId::from("s-1"));
        session.mark_pending(
            AuthType::AuthCode,
            PendingChallenge::Redirect {
                state: "s-1".into(),
                issued_at: Utc::now(),
            },
        );
        session
    }

    fn identity() -> ExchangedIdentity {
        ExchangedIdentity {
            credentials: Credentials::issued_now("tok", "Bearer", Some(3600)),
            principal: Principal {
                user_id: "sub-1".into(),
                email: Some("user@example.com".into()),
            },
        }
    }

    #[tokio::test]
    async fn begin_builds_encoded_redirect() {
        let driver = AuthCodeDriver::new(config(), Arc::new(MockCodeExchange::new()));
        let issued = driver.begin(&SessionId::from("s-1")).await.unwrap();
        let AuthChallenge::AuthCode {
            authorization_url, ..
        } = issued.challenge
        else {
            panic!("expected redirect challenge");
        };
        let url = Url::parse(&authorization_url).unwrap();
        assert_eq!(url.path(), "/oauth2/authorize");
        let query: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(query.contains(&("client_id".into(), "client 1".into())));
        assert!(query.contains(&("scope".into(), "openid email".into())));
        assert!(query.contains(&("state".into(), "s-1".into())));
        assert!(query.contains(&(
            "redirect_uri".into(),
            "https://app.example.com/callback".into()
        )));
    }

    #[tokio::test]
    async fn code_exchange_authenticates() {
        let mut exchange = MockCodeExchange::new();
        exchange
            .expect_exchange()
            .withf(|code| code == "abc")
            .times(1)
            .returning(|_| Ok(identity()));

        let driver = AuthCodeDriver::new(config(), Arc::new(exchange));
        let evidence = AuthEvidence {
            code: Some("abc".into()),
            state: Some("s-1".into()),
            ..AuthEvidence::default()
        };
        let outcome = driver.complete(&pending_session(), &evidence).await;
        let AuthOutcome::Authenticated(result) = outcome else {
            panic!("expected authenticated, got {outcome:?}");
        };
        assert_eq!(result.principal.email.as_deref(), Some("user@example.com"));
    }

    #[tokio::test]
    async fn state_mismatch_fails_without_exchange() {
        let mut exchange = MockCodeExchange::new();
        exchange.expect_exchange().times(0);

        let driver = AuthCodeDriver::new(config(), Arc::new(exchange));
        let evidence = AuthEvidence {
            code: Some("abc".into()),
            state: Some("someone-else".into()),
            ..AuthEvidence::default()
        };
        let outcome = driver.complete(&pending_session(), &evidence).await;
        assert_eq!(outcome, AuthOutcome::Failed("state mismatch".into()));
    }

    #[tokio::test]
    async fn missing_code_fails() {
        let driver = AuthCodeDriver::new(config(), Arc::new(MockCodeExchange::new()));
        let outcome = driver
            .complete(&pending_session(), &AuthEvidence::default())
            .await;
        assert!(matches!(outcome, AuthOutcome::Failed(_)));
    }

    #[tokio::test]
    async fn rejected_code_fails() {
        let mut exchange = MockCodeExchange::new();
        exchange
            .expect_exchange()
            .returning(|_| Err(ExchangeError::InvalidGrant("code reused".into())));

        let driver = AuthCodeDriver::new(config(), Arc::new(exchange));
        let evidence = AuthEvidence {
            code: Some("abc".into()),
            state: Some("s-1".into()),
            ..AuthEvidence::default()
        };
        let outcome = driver.complete(&pending_session(), &evidence).await;
        assert_eq!(outcome, AuthOutcome::Failed("invalid grant: code reused".into()));
    }

    #[tokio::test]
    async fn stateless_redirect_fails_without_exchange() {
        let mut exchange = MockCodeExchange::new();
        exchange.expect_exchange().times(0);

        let driver = AuthCodeDriver::new(config(), Arc::new(exchange));
        let evidence = AuthEvidence {
            code: Some("abc".into()),
            ..AuthEvidence::default()
        };
        let outcome = driver.complete(&pending_session(), &evidence).await;
        assert_eq!(outcome, AuthOutcome::Failed("state missing".into()));
    }
}
