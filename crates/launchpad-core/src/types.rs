//! Core types for Launchpad
//!
//! Defines the values that flow between the orchestrator phases:
//! - Agent descriptors and sandbox test outcomes
//! - Deployment sessions with their authentication state
//! - Deployment targets and results

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use ulid::Ulid;

/// Opaque deployment session identifier (caller-supplied or generated)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Generate a fresh random session id
    #[inline]
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Borrow the raw id
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for SessionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unique descriptor identifier (ULID for sortability)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DescriptorId(pub Ulid);

impl DescriptorId {
    /// Generate new descriptor ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for DescriptorId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DescriptorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Runtime family an agent's model is served from
///
/// `Unrecognized` only appears when a descriptor is deserialized from an
/// untrusted payload; [`crate::AgentConfigBuilder`] never produces it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ModelFamily {
    /// Hosted model behind the managed agent runtime
    CloudManaged,
    /// Model served by a local runtime inside a container
    LocalContainer,
    /// Any other value seen on the wire
    Unrecognized(String),
}

impl ModelFamily {
    /// Parse one of the recognized spellings (case-insensitive)
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "cloud_managed" | "cloud-managed" | "bedrock" => Some(Self::CloudManaged),
            "local_container" | "local-container" | "ollama" => Some(Self::LocalContainer),
            _ => None,
        }
    }

    /// Canonical wire name
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::CloudManaged => "cloud_managed",
            Self::LocalContainer => "local_container",
            Self::Unrecognized(raw) => raw,
        }
    }

    /// Whether a sandbox backend exists for this family
    #[inline]
    #[must_use]
    pub fn is_recognized(&self) -> bool {
        !matches!(self, Self::Unrecognized(_))
    }
}

impl From<String> for ModelFamily {
    fn from(value: String) -> Self {
        Self::parse(&value).unwrap_or(Self::Unrecognized(value))
    }
}

impl From<ModelFamily> for String {
    fn from(value: ModelFamily) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical agent description, immutable once built
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentDescriptor {
    /// Generated identifier
    #[serde(default)]
    pub id: DescriptorId,
    /// Display name
    pub name: String,
    /// System prompt handed to the model
    pub system_prompt: String,
    /// Tools the agent may call
    #[serde(default)]
    pub tool_names: BTreeSet<String>,
    /// Runtime family
    pub model_family: ModelFamily,
    /// Model identifier within the family
    pub model_id: String,
    /// Owning user
    pub owner_id: String,
    /// Creation time
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl AgentDescriptor {
    /// Two descriptors are equivalent when they differ only in generated fields
    #[must_use]
    pub fn is_equivalent(&self, other: &Self) -> bool {
        self.name == other.name
            && self.system_prompt == other.system_prompt
            && self.tool_names == other.tool_names
            && self.model_family == other.model_family
            && self.model_id == other.model_id
            && self.owner_id == other.owner_id
    }
}

/// Sandbox backend a test ran in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SandboxEnvironment {
    /// Locally built container with a bundled model runtime
    ContainerSandbox,
    /// Managed agent runtime service
    ManagedSandbox,
}

/// Result of one sandbox run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestOutcome {
    pub success: bool,
    pub environment: SandboxEnvironment,
    pub model_id: String,
    pub raw_response: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TestOutcome {
    /// Successful run
    #[inline]
    #[must_use]
    pub fn passed(
        environment: SandboxEnvironment,
        model_id: impl Into<String>,
        raw_response: impl Into<String>,
    ) -> Self {
        Self {
            success: true,
            environment,
            model_id: model_id.into(),
            raw_response: raw_response.into(),
            error: None,
        }
    }

    /// Failed run; `raw_response` keeps whatever output was captured
    #[inline]
    #[must_use]
    pub fn failed(
        environment: SandboxEnvironment,
        model_id: impl Into<String>,
        error: impl Into<String>,
        raw_response: impl Into<String>,
    ) -> Self {
        Self {
            success: false,
            environment,
            model_id: model_id.into(),
            raw_response: raw_response.into(),
            error: Some(error.into()),
        }
    }
}

/// Per-session authentication state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthState {
    Unauthenticated,
    Pending,
    Authenticated,
    Failed,
}

impl fmt::Display for AuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unauthenticated => "unauthenticated",
            Self::Pending => "pending",
            Self::Authenticated => "authenticated",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Identity flow driving a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthType {
    /// Polling device authorization (delegated-account flow)
    #[serde(alias = "aws_sso")]
    DeviceCode,
    /// Redirect authorization code (hosted-login flow)
    #[serde(alias = "cognito")]
    AuthCode,
}

impl fmt::Display for AuthType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DeviceCode => f.write_str("device_code"),
            Self::AuthCode => f.write_str("auth_code"),
        }
    }
}

/// Deployment option the user picked before authenticating
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentPreference {
    /// Deploy into the user's own cloud account
    #[serde(alias = "aws_account")]
    UserAccount,
    /// Deploy into the platform's tenant-isolated environment
    #[serde(alias = "managed")]
    ManagedTenant,
}

impl DeploymentPreference {
    /// Identity flow that proves the user for this option
    #[inline]
    #[must_use]
    pub fn auth_type(self) -> AuthType {
        match self {
            Self::UserAccount => AuthType::DeviceCode,
            Self::ManagedTenant => AuthType::AuthCode,
        }
    }
}

/// Token bundle obtained from an identity provider
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub access_token: String,
    pub token_type: String,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Credentials {
    /// Build from a provider's relative `expires_in`
    #[must_use]
    pub fn issued_now(
        access_token: impl Into<String>,
        token_type: impl Into<String>,
        expires_in_secs: Option<u64>,
    ) -> Self {
        let expires_at = expires_in_secs
            .and_then(|secs| i64::try_from(secs).ok())
            .and_then(chrono::Duration::try_seconds)
            .and_then(|ttl| Utc::now().checked_add_signed(ttl));
        Self {
            access_token: access_token.into(),
            token_type: token_type.into(),
            expires_at,
        }
    }

    /// Whether the token is past its expiry at `now`
    #[inline]
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_token", &"<redacted>")
            .field("token_type", &self.token_type)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Authenticated user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Driver-private data needed to finish an identity flow
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PendingChallenge {
    /// Device authorization in progress
    Device {
        client_id: String,
        client_secret: String,
        device_code: String,
        expires_at: DateTime<Utc>,
        interval_secs: u64,
    },
    /// Redirect issued; waiting for the provider callback
    Redirect {
        state: String,
        issued_at: DateTime<Utc>,
    },
}

impl fmt::Debug for PendingChallenge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Device {
                client_id,
                expires_at,
                interval_secs,
                ..
            } => f
                .debug_struct("Device")
                .field("client_id", client_id)
                .field("expires_at", expires_at)
                .field("interval_secs", interval_secs)
                .finish_non_exhaustive(),
            Self::Redirect { state, issued_at } => f
                .debug_struct("Redirect")
                .field("state", state)
                .field("issued_at", issued_at)
                .finish(),
        }
    }
}

/// Mutable per-attempt deployment session
///
/// Only the authentication router changes a session; everything else reads
/// snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentSession {
    pub session_id: SessionId,
    pub auth_state: AuthState,
    pub auth_type: Option<AuthType>,
    pub credentials: Option<Credentials>,
    pub principal: Option<Principal>,
    pub pending: Option<PendingChallenge>,
    pub failure: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DeploymentSession {
    /// Fresh unauthenticated session
    #[must_use]
    pub fn new(session_id: SessionId) -> Self {
        let now = Utc::now();
        Self {
            session_id,
            auth_state: AuthState::Unauthenticated,
            auth_type: None,
            credentials: None,
            principal: None,
            pending: None,
            failure: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[inline]
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.auth_state == AuthState::Authenticated
    }

    /// Record an issued challenge
    pub fn mark_pending(&mut self, auth_type: AuthType, pending: PendingChallenge) {
        self.auth_state = AuthState::Pending;
        self.auth_type = Some(auth_type);
        self.pending = Some(pending);
        self.failure = None;
        self.touch();
    }

    /// Store the granted credentials and principal
    pub fn mark_authenticated(&mut self, credentials: Credentials, principal: Principal) {
        self.auth_state = AuthState::Authenticated;
        self.credentials = Some(credentials);
        self.principal = Some(principal);
        self.pending = None;
        self.touch();
    }

    /// Record a terminal failure
    pub fn mark_failed(&mut self, reason: impl Into<String>) {
        self.auth_state = AuthState::Failed;
        self.pending = None;
        self.failure = Some(reason.into());
        self.touch();
    }

    /// Drop all auth data and return to `Unauthenticated`
    pub fn reset(&mut self) {
        self.auth_state = AuthState::Unauthenticated;
        self.auth_type = None;
        self.credentials = None;
        self.principal = None;
        self.pending = None;
        self.failure = None;
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Production deployment destination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentTier {
    SharedPlatform,
    UserAccount,
    ManagedTenant,
}

impl fmt::Display for DeploymentTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::SharedPlatform => "shared_platform",
            Self::UserAccount => "user_account",
            Self::ManagedTenant => "managed_tenant",
        };
        f.write_str(name)
    }
}

/// Tier selection with tier-specific parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "tier", rename_all = "snake_case")]
pub enum DeploymentTarget {
    /// Platform-owned runtime; pre-authorized by the platform
    SharedPlatform,
    /// User's own account via delegated role assumption
    UserAccount { role_arn: String, external_id: String },
    /// Platform-owned, isolated by naming and tags
    ///
    /// The tenant namespace is the signed-in principal's user id; a supplied
    /// `tenant_id` must name that same tenant.
    ManagedTenant {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tenant_id: Option<String>,
    },
}

impl DeploymentTarget {
    #[inline]
    #[must_use]
    pub fn tier(&self) -> DeploymentTier {
        match self {
            Self::SharedPlatform => DeploymentTier::SharedPlatform,
            Self::UserAccount { .. } => DeploymentTier::UserAccount,
            Self::ManagedTenant { .. } => DeploymentTier::ManagedTenant,
        }
    }

    /// Whether an authenticated session is required before deploying
    #[inline]
    #[must_use]
    pub fn requires_authentication(&self) -> bool {
        !matches!(self, Self::SharedPlatform)
    }
}

/// Terminal result of a deployment call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentResult {
    pub success: bool,
    pub tier: DeploymentTier,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub message: String,
}

impl DeploymentResult {
    /// Runtime created
    #[must_use]
    pub fn deployed(
        tier: DeploymentTier,
        runtime_handle: impl Into<String>,
        endpoint: Option<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            success: true,
            tier,
            runtime_handle: Some(runtime_handle.into()),
            endpoint,
            error: None,
            message: message.into(),
        }
    }

    /// Provider-side failure
    #[must_use]
    pub fn failed(tier: DeploymentTier, error: impl Into<String>) -> Self {
        Self {
            success: false,
            tier,
            runtime_handle: None,
            endpoint: None,
            error: Some(error.into()),
            message: format!("Deployment to {tier} failed"),
        }
    }
}
