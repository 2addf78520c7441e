//! Orchestrator configuration
//!
//! Loaded from TOML. Every section has defaults so an empty file is a valid
//! (if not very useful) configuration.

use crate::error::OrchestratorError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub logging: LoggingConfig,
    pub sandbox: SandboxConfig,
    pub identity: IdentityConfig,
    pub session: SessionConfig,
    pub deploy: DeployConfig,
}

impl OrchestratorConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a TOML document
    ///
    /// # Errors
    /// `OrchestratorError::Config` on malformed TOML
    pub fn from_toml_str(raw: &str) -> Result<Self, OrchestratorError> {
        toml::from_str(raw).map_err(|e| OrchestratorError::Config(e.to_string()))
    }

    /// Load a TOML file, then resolve the hosted-login provider file if one is named
    ///
    /// # Errors
    /// `OrchestratorError::Config` if either file is unreadable or malformed
    pub fn load(path: impl AsRef<Path>) -> Result<Self, OrchestratorError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            OrchestratorError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        let mut config = Self::from_toml_str(&raw)?;
        if config.identity.hosted.is_none() {
            if let Some(file) = config.identity.hosted_config_file.clone() {
                let file = if file.is_relative() {
                    path.parent().map_or(file.clone(), |dir| dir.join(&file))
                } else {
                    file
                };
                config.identity.hosted = Some(HostedLoginConfig::load_json(file)?);
            }
        }
        Ok(config)
    }

    /// Check values that would only fail later at call time
    ///
    /// # Errors
    /// `OrchestratorError::Config` naming the offending key
    pub fn validate(&self) -> Result<(), OrchestratorError> {
        if self.session.ttl_secs == 0 {
            return Err(OrchestratorError::Config("session.ttl_secs must be > 0".into()));
        }
        if self.sandbox.run_timeout_secs == 0 || self.sandbox.build_timeout_secs == 0 {
            return Err(OrchestratorError::Config(
                "sandbox timeouts must be > 0".into(),
            ));
        }
        self.identity.device.validate()?;
        if let Some(hosted) = &self.identity.hosted {
            hosted.validate()?;
        }
        Ok(())
    }

    /// With hosted-login provider configuration
    #[inline]
    #[must_use]
    pub fn with_hosted_login(mut self, hosted: HostedLoginConfig) -> Self {
        self.identity.hosted = Some(hosted);
        self
    }

    /// With session time-to-live
    #[inline]
    #[must_use]
    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session.ttl_secs = ttl.as_secs();
        self
    }
}

/// Logging configuration (stderr subscriber)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset
    pub level: String,
    /// Emit JSON lines instead of compact text
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Sandbox backends
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Container runtime CLI
    pub container_binary: String,
    /// Image tag prefix; the owner id is appended
    pub image_prefix: String,
    /// Base image for the container build recipe
    pub base_image: String,
    /// Local model runtime address inside the container
    pub local_runtime_url: String,
    pub build_timeout_secs: u64,
    pub run_timeout_secs: u64,
    /// Managed agent-runtime CLI
    pub managed_cli_binary: String,
    pub managed_step_timeout_secs: u64,
    /// Parent directory for scratch dirs; system temp dir when unset
    pub scratch_root: Option<PathBuf>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            container_binary: "docker".to_string(),
            image_prefix: "agent-test".to_string(),
            base_image: "python:3.11-slim".to_string(),
            local_runtime_url: "http://localhost:11434".to_string(),
            build_timeout_secs: 900,
            run_timeout_secs: 300,
            managed_cli_binary: "agentcore".to_string(),
            managed_step_timeout_secs: 600,
            scratch_root: None,
        }
    }
}

impl SandboxConfig {
    #[inline]
    #[must_use]
    pub fn build_timeout(&self) -> Duration {
        Duration::from_secs(self.build_timeout_secs)
    }

    #[inline]
    #[must_use]
    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout_secs)
    }

    #[inline]
    #[must_use]
    pub fn managed_step_timeout(&self) -> Duration {
        Duration::from_secs(self.managed_step_timeout_secs)
    }
}

/// Identity providers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    pub device: DeviceFlowConfig,
    pub hosted: Option<HostedLoginConfig>,
    /// JSON provider file used when `hosted` is not given inline
    pub hosted_config_file: Option<PathBuf>,
}

/// Device authorization provider (delegated-account flow)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceFlowConfig {
    /// Base URL of the OIDC service (`/client/register`, `/device_authorization`, `/token`)
    pub oidc_endpoint: String,
    /// Portal start URL sent with the device authorization request
    pub start_url: String,
    /// Name for the ephemeral client registration
    pub client_name: String,
    /// Scopes requested for the ephemeral client; `openid` makes the
    /// token grant carry an id token naming the user
    pub scopes: Vec<String>,
    /// OIDC user-info endpoint, used when the grant carries no id token
    pub userinfo_url: Option<String>,
    pub request_timeout_secs: u64,
}

impl Default for DeviceFlowConfig {
    fn default() -> Self {
        Self {
            oidc_endpoint: "https://oidc.us-east-1.amazonaws.com".to_string(),
            start_url: "https://your-sso-portal.awsapps.com/start".to_string(),
            client_name: "Launchpad-Deployer".to_string(),
            scopes: ["openid", "email", "sso:account:access"]
                .map(String::from)
                .to_vec(),
            userinfo_url: None,
            request_timeout_secs: 30,
        }
    }
}

impl DeviceFlowConfig {
    /// Check that a signed-in user can be resolved after the grant
    ///
    /// # Errors
    /// `OrchestratorError::Config` without the `openid` scope or a user-info
    /// endpoint
    pub fn validate(&self) -> Result<(), OrchestratorError> {
        let has_openid = self.scopes.iter().any(|scope| scope == "openid");
        if !has_openid && self.userinfo_url.is_none() {
            return Err(OrchestratorError::Config(
                "identity.device needs the openid scope or a userinfo_url to resolve the user"
                    .into(),
            ));
        }
        Ok(())
    }
}

/// Hosted-login provider (authorization-code flow)
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct HostedLoginConfig {
    /// Provider base URL, e.g. `https://auth.example.com`
    pub domain: String,
    pub client_id: String,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,
}

fn default_scopes() -> Vec<String> {
    ["openid", "email", "profile", "aws.cognito.signin.user.admin"]
        .map(String::from)
        .to_vec()
}

fn default_redirect_uri() -> String {
    "http://localhost:8080/callback".to_string()
}

impl HostedLoginConfig {
    /// Load the provider's JSON configuration file
    ///
    /// # Errors
    /// `OrchestratorError::Config` if the file is unreadable or malformed
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, OrchestratorError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            OrchestratorError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        let config: Self = serde_json::from_str(&raw).map_err(|e| {
            OrchestratorError::Config(format!("invalid provider file {}: {e}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    /// `OrchestratorError::Config` when domain or client id is blank
    pub fn validate(&self) -> Result<(), OrchestratorError> {
        if self.domain.trim().is_empty() || self.client_id.trim().is_empty() {
            return Err(OrchestratorError::Config(
                "hosted login needs a domain and client_id".into(),
            ));
        }
        Ok(())
    }
}

impl std::fmt::Debug for HostedLoginConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostedLoginConfig")
            .field("domain", &self.domain)
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "<redacted>"))
            .field("scopes", &self.scopes)
            .field("redirect_uri", &self.redirect_uri)
            .finish()
    }
}

/// Session store policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Sessions untouched for this long are dropped
    pub ttl_secs: u64,
    pub max_sessions: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 3600,
            max_sessions: 10_000,
        }
    }
}

impl SessionConfig {
    #[inline]
    #[must_use]
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// Production deployment settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeployConfig {
    pub region: String,
    /// Cloud CLI used for the control-plane calls
    pub aws_binary: String,
    /// Registry the artifact producer pushes agent images to
    pub container_registry: String,
    /// Execution role for shared-platform runtimes
    pub platform_execution_role_arn: String,
    /// Execution role for tenant runtimes
    pub tenant_execution_role_arn: String,
    /// Execution role name inside a user's account
    pub user_execution_role_name: String,
    /// SSO permission set the signed-in user enters their account with
    /// before assuming the delegated role
    pub sso_role_name: String,
    pub network_mode: String,
    /// Base URL for tenant endpoints: `<base>/agents/<tenant>/<name>`
    pub managed_endpoint_base: String,
    pub command_timeout_secs: u64,
    /// Lifetime of delegated credentials
    pub delegated_session_secs: u64,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            region: "us-east-1".to_string(),
            aws_binary: "aws".to_string(),
            container_registry: "public.ecr.aws/launchpad".to_string(),
            platform_execution_role_arn: String::new(),
            tenant_execution_role_arn: String::new(),
            user_execution_role_name: "LaunchpadAgentExecution".to_string(),
            sso_role_name: "LaunchpadDeployer".to_string(),
            network_mode: "PUBLIC".to_string(),
            managed_endpoint_base: "https://agents.launchpad.local".to_string(),
            command_timeout_secs: 300,
            delegated_session_secs: 900,
        }
    }
}

impl DeployConfig {
    #[inline]
    #[must_use]
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}
