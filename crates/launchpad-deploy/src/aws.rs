//! Cloud CLI adapters
//!
//! `aws bedrock-agentcore-control create-agent-runtime` behind
//! [`RuntimeProvisioner`]; `aws sso get-role-credentials` followed by
//! `aws sts assume-role` behind [`DelegatedSessionOpener`]. Every call asks
//! for `--output json`.

use crate::delegation::{account_id, DelegatedSessionOpener};
use crate::error::ProvisionError;
use crate::provisioner::{ProvisionedRuntime, RuntimeProvisioner, RuntimeRequest};
use chrono::Utc;
use launchpad_core::process::{run_command, CommandSpec};
use launchpad_core::{Credentials, DeployConfig, Principal};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Invocation settings for the cloud CLI
#[derive(Clone)]
pub struct AwsCli {
    binary: String,
    region: String,
    timeout: Duration,
    env: Vec<(String, String)>,
}

impl fmt::Debug for AwsCli {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsCli")
            .field("binary", &self.binary)
            .field("region", &self.region)
            .field("timeout", &self.timeout)
            .field("delegated", &!self.env.is_empty())
            .finish()
    }
}

impl AwsCli {
    #[must_use]
    pub fn new(binary: impl Into<String>, region: impl Into<String>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            region: region.into(),
            timeout,
            env: Vec::new(),
        }
    }

    #[must_use]
    pub fn from_config(config: &DeployConfig) -> Self {
        Self::new(&config.aws_binary, &config.region, config.command_timeout())
    }

    /// Same CLI, authenticated with temporary credentials
    #[must_use]
    pub fn with_credentials(&self, creds: &TemporaryCredentials) -> Self {
        let mut cli = self.clone();
        cli.env = vec![
            ("AWS_ACCESS_KEY_ID".into(), creds.access_key_id.clone()),
            ("AWS_SECRET_ACCESS_KEY".into(), creds.secret_access_key.clone()),
            ("AWS_SESSION_TOKEN".into(), creds.session_token.clone()),
        ];
        cli
    }

    fn spec(&self, args: &[String]) -> CommandSpec {
        let spec = CommandSpec::new(&self.binary)
            .args(args.iter().cloned())
            .args(["--region", self.region.as_str(), "--output", "json"])
            .with_timeout(self.timeout);
        self.env
            .iter()
            .fold(spec, |spec, (key, value)| spec.env(key, value))
    }

    /// Run a subcommand and decode its JSON output
    async fn run_json<T>(&self, args: &[String]) -> Result<T, ProvisionError>
    where
        T: DeserializeOwned + Send,
    {
        let step = args.iter().take(2).cloned().collect::<Vec<_>>().join(" ");
        tracing::debug!(command = %step, region = %self.region, "running cloud cli");

        let output = run_command(&self.spec(args)).await?;
        if !output.succeeded() {
            return Err(ProvisionError::Provider(format!("{step}: {}", output.stderr.trim())));
        }
        serde_json::from_str(&output.stdout)
            .map_err(|e| ProvisionError::Decode(format!("{step}: {e}")))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateRuntimeResponse {
    agent_runtime_arn: String,
    #[serde(default)]
    endpoint: Option<String>,
}

/// Arguments for `create-agent-runtime`
#[must_use]
pub fn create_runtime_args(request: &RuntimeRequest) -> Vec<String> {
    let mut args = vec![
        "bedrock-agentcore-control".to_string(),
        "create-agent-runtime".into(),
        "--agent-runtime-name".into(),
        request.runtime_name.clone(),
        "--agent-runtime-artifact".into(),
        json!({ "containerConfiguration": { "containerUri": request.container_uri } }).to_string(),
        "--role-arn".into(),
        request.execution_role_arn.clone(),
        "--network-configuration".into(),
        json!({ "networkMode": request.network_mode }).to_string(),
    ];
    if !request.tags.is_empty() {
        args.push("--tags".into());
        args.push(json!(request.tags).to_string());
    }
    args
}

/// Control-plane client running as the platform, or as a delegated user
#[derive(Debug, Clone)]
pub struct AwsRuntimeProvisioner {
    cli: AwsCli,
}

impl AwsRuntimeProvisioner {
    #[must_use]
    pub fn new(cli: AwsCli) -> Self {
        Self { cli }
    }
}

#[async_trait::async_trait]
impl RuntimeProvisioner for AwsRuntimeProvisioner {
    #[tracing::instrument(skip_all, fields(runtime = %request.runtime_name))]
    async fn create_runtime(
        &self,
        request: &RuntimeRequest,
    ) -> Result<ProvisionedRuntime, ProvisionError> {
        let response: CreateRuntimeResponse =
            self.cli.run_json(&create_runtime_args(request)).await?;
        Ok(ProvisionedRuntime {
            runtime_arn: response.agent_runtime_arn,
            endpoint: response.endpoint,
        })
    }
}

/// Short-lived credentials from SSO or role assumption
#[derive(Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TemporaryCredentials {
    #[serde(alias = "accessKeyId")]
    pub access_key_id: String,
    #[serde(alias = "secretAccessKey")]
    pub secret_access_key: String,
    #[serde(alias = "sessionToken")]
    pub session_token: String,
}

impl fmt::Debug for TemporaryCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemporaryCredentials")
            .field("access_key_id", &self.access_key_id)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RoleCredentialsResponse {
    role_credentials: TemporaryCredentials,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AssumeRoleResponse {
    credentials: TemporaryCredentials,
}

/// `--role-session-name` for a principal: `[\w+=,.@-]{2,64}`
#[must_use]
pub fn role_session_name(principal: &Principal) -> String {
    let mut name: String = format!("launchpad-{}", principal.user_id)
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || "_+=,.@-".contains(c) {
                c
            } else {
                '-'
            }
        })
        .collect();
    name.truncate(64);
    name
}

/// Arguments for `sso get-role-credentials` with the user's access token
#[must_use]
pub fn role_credentials_args(account: &str, role_name: &str, access_token: &str) -> Vec<String> {
    vec![
        "sso".to_string(),
        "get-role-credentials".into(),
        "--account-id".into(),
        account.into(),
        "--role-name".into(),
        role_name.into(),
        "--access-token".into(),
        access_token.into(),
    ]
}

/// Arguments for `sts assume-role` into the delegated role
#[must_use]
pub fn assume_role_args(
    role_arn: &str,
    principal: &Principal,
    external_id: &str,
    session_secs: u64,
) -> Vec<String> {
    vec![
        "sts".to_string(),
        "assume-role".into(),
        "--role-arn".into(),
        role_arn.into(),
        "--role-session-name".into(),
        role_session_name(principal),
        "--external-id".into(),
        external_id.into(),
        "--duration-seconds".into(),
        session_secs.to_string(),
    ]
}

fn assume_failure(err: ProvisionError) -> ProvisionError {
    match err {
        ProvisionError::Provider(msg) => ProvisionError::AssumeRole(msg),
        other => other,
    }
}

/// Opens the delegated role as the signed-in user
///
/// The user's SSO access token is exchanged for credentials in the target
/// account under `sso_role_name`; those credentials then assume the
/// delegated role with the caller's external id.
#[derive(Debug, Clone)]
pub struct StsDelegatedSessionOpener {
    cli: AwsCli,
    session_secs: u64,
    sso_role_name: String,
}

impl StsDelegatedSessionOpener {
    #[must_use]
    pub fn new(cli: AwsCli, session_secs: u64, sso_role_name: impl Into<String>) -> Self {
        Self {
            cli,
            session_secs,
            sso_role_name: sso_role_name.into(),
        }
    }

    #[must_use]
    pub fn from_config(config: &DeployConfig) -> Self {
        Self::new(
            AwsCli::from_config(config),
            config.delegated_session_secs,
            &config.sso_role_name,
        )
    }
}

#[async_trait::async_trait]
impl DelegatedSessionOpener for StsDelegatedSessionOpener {
    #[tracing::instrument(skip(self, credentials, external_id), fields(user = %principal.user_id))]
    async fn open(
        &self,
        credentials: &Credentials,
        principal: &Principal,
        role_arn: &str,
        external_id: &str,
    ) -> Result<Arc<dyn RuntimeProvisioner>, ProvisionError> {
        if credentials.is_expired_at(Utc::now()) {
            return Err(ProvisionError::ExpiredCredentials);
        }
        let account = account_id(role_arn).ok_or_else(|| {
            ProvisionError::InvalidRequest(format!("{role_arn} is not a role ARN"))
        })?;

        let user: RoleCredentialsResponse = self
            .cli
            .run_json(&role_credentials_args(
                account,
                &self.sso_role_name,
                &credentials.access_token,
            ))
            .await
            .map_err(assume_failure)?;
        tracing::debug!(%account, "user credentials issued for target account");

        let delegated: AssumeRoleResponse = self
            .cli
            .with_credentials(&user.role_credentials)
            .run_json(&assume_role_args(
                role_arn,
                principal,
                external_id,
                self.session_secs,
            ))
            .await
            .map_err(assume_failure)?;
        tracing::info!("delegated role assumed");
        Ok(Arc::new(AwsRuntimeProvisioner::new(
            self.cli.with_credentials(&delegated.credentials),
        )))
    }
}
