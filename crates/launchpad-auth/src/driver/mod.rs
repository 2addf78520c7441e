//! Identity flow drivers
//!
//! A driver issues a challenge for a session and later turns the caller's
//! evidence into an [`AuthOutcome`]. Drivers never touch the session store.

pub mod device;
pub mod hosted;

use crate::error::DriverFailure;
use launchpad_core::{
    AuthType, Credentials, DeploymentSession, PendingChallenge, Principal, SessionId,
};
use serde::{Deserialize, Serialize};

pub use device::{DeviceAuthorizationApi, DeviceCodeDriver, OidcDeviceClient};
pub use hosted::{AuthCodeDriver, CodeExchange, HostedLoginClient};

/// Caller-facing challenge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "auth_type", rename_all = "snake_case")]
pub enum AuthChallenge {
    /// Show a user code and verification URL, then poll
    DeviceCode {
        device_code: String,
        user_code: String,
        verification_uri: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        verification_uri_complete: Option<String>,
        expires_in: u64,
        interval: u64,
        message: String,
    },
    /// Send the user to the provider's login page
    AuthCode {
        authorization_url: String,
        message: String,
    },
}

/// Challenge plus the data the driver needs to finish the flow
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedChallenge {
    pub challenge: AuthChallenge,
    pub pending: PendingChallenge,
}

/// What the caller brings back to complete a flow
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthEvidence {
    /// Device code to poll with; the stored one is used when absent
    pub device_code: Option<String>,
    /// Authorization code from the redirect callback
    pub code: Option<String>,
    /// `state` echoed by the redirect callback
    pub state: Option<String>,
}

/// Granted identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthResult {
    pub credentials: Credentials,
    pub principal: Principal,
}

/// Result of one completion attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    Authenticated(AuthResult),
    /// Not finished yet; poll again
    Pending,
    Failed(String),
}

/// Identity flow contract
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait IdentityDriver: Send + Sync {
    /// Flow this driver implements
    fn auth_type(&self) -> AuthType;

    /// Issue a challenge for `session_id`
    async fn begin(&self, session_id: &SessionId) -> Result<IssuedChallenge, DriverFailure>;

    /// Try to finish the flow recorded in `session`. At most one provider
    /// round trip per call; never loops.
    async fn complete(&self, session: &DeploymentSession, evidence: &AuthEvidence) -> AuthOutcome;
}
