//! Device-code driver (delegated-account flow)
//!
//! `begin` registers an ephemeral public client and starts a device
//! authorization; `complete` makes exactly one token request per call.

use super::{
    AuthChallenge, AuthEvidence, AuthOutcome, AuthResult, IdentityDriver, IssuedChallenge,
};
use crate::error::{DeviceFlowError, DriverFailure};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::Utc;
use launchpad_core::{
    AuthType, Credentials, DeploymentSession, DeviceFlowConfig, PendingChallenge, Principal,
    SessionId,
};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Poll interval when the provider does not announce one
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;
const DEVICE_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:device_code";
/// Upper bound on a challenge lifetime, whatever the provider says
const MAX_CHALLENGE_SECS: u64 = 86_400;

/// Ephemeral client registration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientRegistration {
    pub client_id: String,
    pub client_secret: String,
}

/// Started device authorization
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceAuthorization {
    pub device_code: String,
    pub user_code: String,
    pub verification_uri: String,
    #[serde(default)]
    pub verification_uri_complete: Option<String>,
    pub expires_in: u64,
    #[serde(default)]
    pub interval: Option<u64>,
}

/// Granted token
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenGrant {
    pub access_token: String,
    #[serde(default = "bearer")]
    pub token_type: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
    /// Present when the client was registered with the `openid` scope
    #[serde(default)]
    pub id_token: Option<String>,
}

fn bearer() -> String {
    "Bearer".to_string()
}

/// Device authorization provider port
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait DeviceAuthorizationApi: Send + Sync {
    async fn register_client(&self) -> Result<ClientRegistration, DeviceFlowError>;

    async fn start_device_authorization(
        &self,
        client: &ClientRegistration,
    ) -> Result<DeviceAuthorization, DeviceFlowError>;

    /// One token request; pending answers come back as errors
    async fn create_token(
        &self,
        client: &ClientRegistration,
        device_code: &str,
    ) -> Result<TokenGrant, DeviceFlowError>;

    /// Resolve the user behind a granted token
    async fn resolve_principal(&self, grant: &TokenGrant) -> Result<Principal, DeviceFlowError>;
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<String>,
    error_description: Option<String>,
}

/// `sub`/`email` claims, from an id token or the user-info endpoint
#[derive(Debug, Deserialize)]
struct UserInfo {
    sub: String,
    #[serde(default)]
    email: Option<String>,
}

impl From<UserInfo> for Principal {
    fn from(info: UserInfo) -> Self {
        Self {
            user_id: info.sub,
            email: info.email,
        }
    }
}

/// Claims of an id token received straight from the token endpoint
///
/// The token arrives over the TLS channel to the issuer, so its signature is
/// not checked here.
fn id_token_principal(id_token: &str) -> Result<Principal, DeviceFlowError> {
    let payload = id_token
        .split('.')
        .nth(1)
        .ok_or_else(|| DeviceFlowError::Transport("id token missing payload".into()))?;
    let raw = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|err| DeviceFlowError::Transport(format!("id token payload: {err}")))?;
    let info: UserInfo = serde_json::from_slice(&raw)
        .map_err(|err| DeviceFlowError::Transport(format!("id token claims: {err}")))?;
    if info.sub.trim().is_empty() {
        return Err(DeviceFlowError::Transport("id token has an empty subject".into()));
    }
    Ok(info.into())
}

/// HTTP client for an OIDC device authorization service
#[derive(Debug, Clone)]
pub struct OidcDeviceClient {
    client: Client,
    base: Url,
    config: DeviceFlowConfig,
}

impl OidcDeviceClient {
    /// # Errors
    /// `DeviceFlowError::Config` if the endpoint is not a URL or the HTTP
    /// client cannot be built
    pub fn new(config: DeviceFlowConfig) -> Result<Self, DeviceFlowError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|err| DeviceFlowError::Config(err.to_string()))?;
        let base = Url::parse(&config.oidc_endpoint).map_err(|err| {
            let endpoint = &config.oidc_endpoint;
            DeviceFlowError::Config(format!("invalid oidc endpoint '{endpoint}': {err}"))
        })?;
        Ok(Self {
            client,
            base,
            config,
        })
    }

    fn url(&self, path: &str) -> Result<Url, DeviceFlowError> {
        self.base
            .join(path)
            .map_err(|err| DeviceFlowError::Config(format!("invalid oidc path '{path}': {err}")))
    }

    async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, DeviceFlowError>
    where
        B: Serialize + Sync,
        T: DeserializeOwned + Send,
    {
        let response = self.client.post(self.url(path)?).json(body).send().await?;
        if response.status().is_success() {
            return Ok(response.json().await?);
        }

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        match serde_json::from_str::<ErrorBody>(&text) {
            Ok(ErrorBody {
                error: Some(code),
                error_description,
            }) => Err(DeviceFlowError::from_code(&code, error_description)),
            _ => Err(DeviceFlowError::Provider {
                code: status.as_u16().to_string(),
                description: text,
            }),
        }
    }
}

#[async_trait::async_trait]
impl DeviceAuthorizationApi for OidcDeviceClient {
    async fn register_client(&self) -> Result<ClientRegistration, DeviceFlowError> {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct RequestBody<'a> {
            client_name: &'a str,
            client_type: &'a str,
            scopes: &'a [String],
        }

        self.post(
            "client/register",
            &RequestBody {
                client_name: &self.config.client_name,
                client_type: "public",
                scopes: &self.config.scopes,
            },
        )
        .await
    }

    async fn start_device_authorization(
        &self,
        client: &ClientRegistration,
    ) -> Result<DeviceAuthorization, DeviceFlowError> {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct RequestBody<'a> {
            client_id: &'a str,
            client_secret: &'a str,
            start_url: &'a str,
        }

        self.post(
            "device_authorization",
            &RequestBody {
                client_id: &client.client_id,
                client_secret: &client.client_secret,
                start_url: &self.config.start_url,
            },
        )
        .await
    }

    async fn create_token(
        &self,
        client: &ClientRegistration,
        device_code: &str,
    ) -> Result<TokenGrant, DeviceFlowError> {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct RequestBody<'a> {
            client_id: &'a str,
            client_secret: &'a str,
            grant_type: &'a str,
            device_code: &'a str,
        }

        self.post(
            "token",
            &RequestBody {
                client_id: &client.client_id,
                client_secret: &client.client_secret,
                grant_type: DEVICE_GRANT_TYPE,
                device_code,
            },
        )
        .await
    }

    async fn resolve_principal(&self, grant: &TokenGrant) -> Result<Principal, DeviceFlowError> {
        if let Some(id_token) = &grant.id_token {
            match id_token_principal(id_token) {
                Ok(principal) => return Ok(principal),
                Err(err) if self.config.userinfo_url.is_some() => {
                    tracing::debug!(error = %err, "unusable id token, asking user-info endpoint");
                }
                Err(err) => return Err(err),
            }
        }
        let Some(endpoint) = &self.config.userinfo_url else {
            return Err(DeviceFlowError::Config(
                "grant carries no id token and identity.device.userinfo_url is not configured"
                    .into(),
            ));
        };
        let response = self
            .client
            .get(endpoint)
            .bearer_auth(&grant.access_token)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(DeviceFlowError::Provider {
                code: response.status().as_u16().to_string(),
                description: "user info lookup rejected".into(),
            });
        }
        let info: UserInfo = response.json().await?;
        Ok(info.into())
    }
}

/// Drives the device authorization flow
pub struct DeviceCodeDriver {
    api: Arc<dyn DeviceAuthorizationApi>,
}

impl DeviceCodeDriver {
    #[must_use]
    pub fn new(api: Arc<dyn DeviceAuthorizationApi>) -> Self {
        Self { api }
    }
}

#[async_trait::async_trait]
impl IdentityDriver for DeviceCodeDriver {
    fn auth_type(&self) -> AuthType {
        AuthType::DeviceCode
    }

    #[tracing::instrument(skip(self), fields(session = %session_id))]
    async fn begin(&self, session_id: &SessionId) -> Result<IssuedChallenge, DriverFailure> {
        let client = self.api.register_client().await?;
        let auth = self.api.start_device_authorization(&client).await?;

        let interval = auth.interval.unwrap_or(DEFAULT_POLL_INTERVAL_SECS);
        let lifetime = i64::try_from(auth.expires_in.min(MAX_CHALLENGE_SECS)).unwrap_or_default();
        let expires_at = Utc::now() + chrono::Duration::seconds(lifetime);
        tracing::info!(expires_in = auth.expires_in, "device authorization started");

        Ok(IssuedChallenge {
            challenge: AuthChallenge::DeviceCode {
                message: format!(
                    "Go to {} and enter code: {}",
                    auth.verification_uri, auth.user_code
                ),
                device_code: auth.device_code.clone(),
                user_code: auth.user_code,
                verification_uri: auth.verification_uri,
                verification_uri_complete: auth.verification_uri_complete,
                expires_in: auth.expires_in,
                interval,
            },
            pending: PendingChallenge::Device {
                client_id: client.client_id,
                client_secret: client.client_secret,
                device_code: auth.device_code,
                expires_at,
                interval_secs: interval,
            },
        })
    }

    #[tracing::instrument(skip_all, fields(session = %session.session_id))]
    async fn complete(&self, session: &DeploymentSession, evidence: &AuthEvidence) -> AuthOutcome {
        let Some(PendingChallenge::Device {
            client_id,
            client_secret,
            device_code,
            expires_at,
            ..
        }) = &session.pending
        else {
            return AuthOutcome::Failed("no device authorization in progress".into());
        };

        if Utc::now() >= *expires_at {
            return AuthOutcome::Failed(DeviceFlowError::ExpiredToken.to_string());
        }

        let client = ClientRegistration {
            client_id: client_id.clone(),
            client_secret: client_secret.clone(),
        };
        let code = evidence.device_code.as_deref().unwrap_or(device_code);

        let grant = match self.api.create_token(&client, code).await {
            Ok(grant) => grant,
            Err(err) if err.is_pending() => {
                tracing::debug!(answer = %err, "device authorization still pending");
                return AuthOutcome::Pending;
            }
            Err(err) => {
                tracing::warn!(error = %err, "device token request failed");
                return AuthOutcome::Failed(err.to_string());
            }
        };

        match self.api.resolve_principal(&grant).await {
            Ok(principal) => AuthOutcome::Authenticated(AuthResult {
                credentials: Credentials::issued_now(
                    grant.access_token,
                    grant.token_type,
                    grant.expires_in,
                ),
                principal,
            }),
            Err(err) => {
                tracing::warn!(error = %err, "user info lookup failed");
                AuthOutcome::Failed(format!("user info lookup failed: {err}"))
            }
        }
    }
}
