//! Testing utilities for the Launchpad workspace
//!
//! Counting stubs for every external port plus descriptor and config
//! fixtures. Stubs record how often they were called so tests can assert
//! that a phase did (or did not) reach the outside world.

#![allow(missing_docs)]

use launchpad_auth::driver::device::{ClientRegistration, DeviceAuthorization, TokenGrant};
use launchpad_auth::driver::hosted::ExchangedIdentity;
use launchpad_auth::{CodeExchange, DeviceAuthorizationApi, DeviceFlowError, ExchangeError};
use launchpad_core::{
    AgentConfigBuilder, AgentDescriptor, Credentials, DeployConfig, HostedLoginConfig,
    OrchestratorConfig, Principal,
};
use launchpad_deploy::{
    DelegatedSessionOpener, ProvisionError, ProvisionedRuntime, RuntimeProvisioner, RuntimeRequest,
};
use launchpad_sandbox::{
    CommandOutput, ContainerRuntime, ManagedRuntimeCli, RunRequest, SandboxError,
};
use serde_json::{json, Map, Value};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

fn record<T>(log: &Mutex<Vec<T>>, entry: T) {
    log.lock().unwrap_or_else(PoisonError::into_inner).push(entry);
}

fn snapshot<T: Clone>(log: &Mutex<Vec<T>>) -> Vec<T> {
    log.lock().unwrap_or_else(PoisonError::into_inner).clone()
}

fn exited(code: i32, stdout: &str, stderr: &str) -> CommandOutput {
    CommandOutput {
        status_code: Some(code),
        stdout: stdout.to_string(),
        stderr: stderr.to_string(),
    }
}

// ----------------------------------------------------------------------------
// Sandbox ports
// ----------------------------------------------------------------------------

/// Container runtime that answers every run with a fixed output
#[derive(Debug, Default)]
pub struct StubContainerRuntime {
    build_error: Option<String>,
    exit_code: i32,
    stdout: String,
    pub builds: AtomicUsize,
    pub runs: AtomicUsize,
    pub teardowns: AtomicUsize,
    requests: Mutex<Vec<RunRequest>>,
}

impl StubContainerRuntime {
    /// Runs exit 0 printing `stdout`
    #[must_use]
    pub fn answering(stdout: &str) -> Self {
        Self {
            stdout: stdout.to_string(),
            ..Self::default()
        }
    }

    /// Runs exit with `code`
    #[must_use]
    pub fn exiting(code: i32, stdout: &str) -> Self {
        Self {
            exit_code: code,
            stdout: stdout.to_string(),
            ..Self::default()
        }
    }

    /// Image builds fail with `reason`
    #[must_use]
    pub fn failing_build(reason: &str) -> Self {
        Self {
            build_error: Some(reason.to_string()),
            ..Self::default()
        }
    }

    pub fn teardown_count(&self) -> usize {
        self.teardowns.load(Ordering::SeqCst)
    }

    pub fn run_count(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }

    pub fn run_requests(&self) -> Vec<RunRequest> {
        snapshot(&self.requests)
    }
}

#[async_trait::async_trait]
impl ContainerRuntime for StubContainerRuntime {
    async fn build_image(&self, _context: &Path, _tag: &str) -> Result<(), SandboxError> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        match &self.build_error {
            Some(reason) => Err(SandboxError::Build(reason.clone())),
            None => Ok(()),
        }
    }

    async fn run_once(&self, request: &RunRequest) -> Result<CommandOutput, SandboxError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        record(&self.requests, request.clone());
        Ok(exited(self.exit_code, &self.stdout, ""))
    }

    async fn teardown(&self, _image: &str, _container_name: &str) -> Result<(), SandboxError> {
        self.teardowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Managed runtime CLI that succeeds every step, answering `invoke` with a fixed body
#[derive(Debug, Default)]
pub struct StubManagedCli {
    invoke_stdout: String,
    failing_step: Option<String>,
    calls: Mutex<Vec<Vec<String>>>,
}

impl StubManagedCli {
    #[must_use]
    pub fn answering(invoke_stdout: &str) -> Self {
        Self {
            invoke_stdout: invoke_stdout.to_string(),
            ..Self::default()
        }
    }

    /// The named subcommand (`configure`, `launch` or `invoke`) exits 1
    #[must_use]
    pub fn failing_at(step: &str) -> Self {
        Self {
            failing_step: Some(step.to_string()),
            ..Self::default()
        }
    }

    /// Argument lists in call order
    pub fn calls(&self) -> Vec<Vec<String>> {
        snapshot(&self.calls)
    }
}

#[async_trait::async_trait]
impl ManagedRuntimeCli for StubManagedCli {
    async fn execute(
        &self,
        _workdir: &Path,
        args: &[String],
    ) -> Result<CommandOutput, SandboxError> {
        record(&self.calls, args.to_vec());
        let step = args.first().map(String::as_str).unwrap_or_default();
        if self.failing_step.as_deref() == Some(step) {
            return Ok(exited(1, "", &format!("{step} failed")));
        }
        let stdout = if step == "invoke" { self.invoke_stdout.as_str() } else { "" };
        Ok(exited(0, stdout, ""))
    }
}

// ----------------------------------------------------------------------------
// Identity ports
// ----------------------------------------------------------------------------

/// Device authorization service; the first `pending_polls` token requests
/// answer `authorization_pending`
#[derive(Debug)]
pub struct StubDeviceApi {
    pending_polls: AtomicUsize,
    deny: bool,
    principal: Principal,
    pub registrations: AtomicUsize,
    pub token_requests: AtomicUsize,
}

impl StubDeviceApi {
    #[must_use]
    pub fn approving_after(pending_polls: usize, principal: Principal) -> Self {
        Self {
            pending_polls: AtomicUsize::new(pending_polls),
            deny: false,
            principal,
            registrations: AtomicUsize::new(0),
            token_requests: AtomicUsize::new(0),
        }
    }

    /// Every token request is denied
    #[must_use]
    pub fn denying() -> Self {
        Self {
            deny: true,
            ..Self::approving_after(0, principal("denied"))
        }
    }

    pub fn token_request_count(&self) -> usize {
        self.token_requests.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl DeviceAuthorizationApi for StubDeviceApi {
    async fn register_client(&self) -> Result<ClientRegistration, DeviceFlowError> {
        self.registrations.fetch_add(1, Ordering::SeqCst);
        Ok(ClientRegistration {
            client_id: "client-1".into(),
            client_secret: "client-secret".into(),
        })
    }

    async fn start_device_authorization(
        &self,
        _client: &ClientRegistration,
    ) -> Result<DeviceAuthorization, DeviceFlowError> {
        Ok(DeviceAuthorization {
            device_code: "device-code-1".into(),
            user_code: "ABCD-EFGH".into(),
            verification_uri: "https://device.example.com".into(),
            verification_uri_complete: Some("https://device.example.com?user_code=ABCD-EFGH".into()),
            expires_in: 600,
            interval: Some(5),
        })
    }

    async fn create_token(
        &self,
        _client: &ClientRegistration,
        _device_code: &str,
    ) -> Result<TokenGrant, DeviceFlowError> {
        self.token_requests.fetch_add(1, Ordering::SeqCst);
        if self.deny {
            return Err(DeviceFlowError::AccessDenied);
        }
        let still_pending = self
            .pending_polls
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if still_pending {
            return Err(DeviceFlowError::AuthorizationPending);
        }
        Ok(TokenGrant {
            access_token: "sso-access-token".into(),
            token_type: "Bearer".into(),
            expires_in: Some(3600),
            id_token: None,
        })
    }

    async fn resolve_principal(&self, _grant: &TokenGrant) -> Result<Principal, DeviceFlowError> {
        Ok(self.principal.clone())
    }
}

/// Hosted-login code exchange accepting exactly one code
#[derive(Debug)]
pub struct StubCodeExchange {
    valid_code: String,
    principal: Principal,
    pub exchanges: AtomicUsize,
}

impl StubCodeExchange {
    #[must_use]
    pub fn accepting(code: &str, principal: Principal) -> Self {
        Self {
            valid_code: code.to_string(),
            principal,
            exchanges: AtomicUsize::new(0),
        }
    }

    pub fn exchange_count(&self) -> usize {
        self.exchanges.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl CodeExchange for StubCodeExchange {
    async fn exchange(&self, code: &str) -> Result<ExchangedIdentity, ExchangeError> {
        self.exchanges.fetch_add(1, Ordering::SeqCst);
        if code != self.valid_code {
            return Err(ExchangeError::InvalidGrant(format!("unknown code {code}")));
        }
        Ok(ExchangedIdentity {
            credentials: Credentials::issued_now("hosted-access-token", "Bearer", Some(3600)),
            principal: self.principal.clone(),
        })
    }
}

// ----------------------------------------------------------------------------
// Deployment ports
// ----------------------------------------------------------------------------

/// Runtime control plane that records every request
#[derive(Debug, Default)]
pub struct CountingProvisioner {
    runtime_arn: String,
    error: Option<String>,
    requests: Mutex<Vec<RuntimeRequest>>,
}

impl CountingProvisioner {
    #[must_use]
    pub fn creating(runtime_arn: &str) -> Self {
        Self {
            runtime_arn: runtime_arn.to_string(),
            ..Self::default()
        }
    }

    /// Every request is rejected with a provider error
    #[must_use]
    pub fn rejecting(reason: &str) -> Self {
        Self {
            error: Some(reason.to_string()),
            ..Self::default()
        }
    }

    pub fn call_count(&self) -> usize {
        self.requests().len()
    }

    pub fn requests(&self) -> Vec<RuntimeRequest> {
        snapshot(&self.requests)
    }
}

#[async_trait::async_trait]
impl RuntimeProvisioner for CountingProvisioner {
    async fn create_runtime(
        &self,
        request: &RuntimeRequest,
    ) -> Result<ProvisionedRuntime, ProvisionError> {
        record(&self.requests, request.clone());
        if let Some(reason) = &self.error {
            return Err(ProvisionError::Provider(reason.clone()));
        }
        Ok(ProvisionedRuntime {
            runtime_arn: self.runtime_arn.clone(),
            endpoint: None,
        })
    }
}

/// Role delegation that either hands out one provisioner or always refuses
#[derive(Debug)]
pub struct StubDelegation {
    provisioner: Option<Arc<CountingProvisioner>>,
    pub opens: AtomicUsize,
}

impl StubDelegation {
    #[must_use]
    pub fn granting(provisioner: Arc<CountingProvisioner>) -> Self {
        Self {
            provisioner: Some(provisioner),
            opens: AtomicUsize::new(0),
        }
    }

    /// Role assumption always fails with `AccessDenied`
    #[must_use]
    pub fn refusing() -> Self {
        Self {
            provisioner: None,
            opens: AtomicUsize::new(0),
        }
    }

    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl DelegatedSessionOpener for StubDelegation {
    async fn open(
        &self,
        _credentials: &Credentials,
        _principal: &Principal,
        role_arn: &str,
        _external_id: &str,
    ) -> Result<Arc<dyn RuntimeProvisioner>, ProvisionError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        match &self.provisioner {
            Some(provisioner) => {
                let provisioner: Arc<dyn RuntimeProvisioner> = provisioner.clone();
                Ok(provisioner)
            }
            None => Err(ProvisionError::AssumeRole(format!(
                "AccessDenied: not authorized to assume {role_arn}"
            ))),
        }
    }
}

// ----------------------------------------------------------------------------
// Fixtures
// ----------------------------------------------------------------------------

pub fn principal(user_id: &str) -> Principal {
    Principal {
        user_id: user_id.to_string(),
        email: Some(format!("{user_id}@example.com")),
    }
}

/// Raw create-agent payload in the front end's camelCase shape
pub fn agent_config(model_type: &str, model_id: &str) -> Map<String, Value> {
    let raw = json!({
        "name": "helper",
        "systemPrompt": "You are a helpful assistant.",
        "modelType": model_type,
        "modelId": model_id,
        "userId": "u-1",
        "tools": ["search", "calculator"],
    });
    match raw {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// Descriptor for a local-container agent running `llama3`
pub fn local_agent() -> AgentDescriptor {
    build_agent(&agent_config("ollama", "llama3"))
}

/// Descriptor for a cloud-managed agent
pub fn managed_agent() -> AgentDescriptor {
    build_agent(&agent_config("bedrock", "anthropic.claude-3-haiku"))
}

fn build_agent(raw: &Map<String, Value>) -> AgentDescriptor {
    match AgentConfigBuilder::new().build(raw) {
        Ok(agent) => agent,
        Err(err) => panic!("fixture payload rejected: {err}"),
    }
}

pub fn hosted_login() -> HostedLoginConfig {
    HostedLoginConfig {
        domain: "https://auth.example.com".into(),
        client_id: "hosted-client".into(),
        client_secret: None,
        scopes: vec!["openid".into(), "email".into()],
        redirect_uri: "http://localhost:8080/callback".into(),
    }
}

/// Configuration with hosted login and deterministic deploy settings
pub fn test_config() -> OrchestratorConfig {
    let mut config = OrchestratorConfig::new().with_hosted_login(hosted_login());
    config.deploy = DeployConfig {
        container_registry: "registry.example.com/agents".into(),
        platform_execution_role_arn: "arn:aws:iam::999999999999:role/platform".into(),
        tenant_execution_role_arn: "arn:aws:iam::999999999999:role/tenant".into(),
        managed_endpoint_base: "https://agents.example.com".into(),
        ..DeployConfig::default()
    };
    config
}

/// Expired bearer credentials
pub fn expired_credentials() -> Credentials {
    Credentials {
        access_token: "stale".into(),
        token_type: "Bearer".into(),
        expires_at: Some(chrono::Utc::now() - chrono::Duration::minutes(5)),
    }
}
