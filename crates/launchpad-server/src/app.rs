//! Wiring from configuration to a ready [`RequestHandler`]

use crate::handler::RequestHandler;
use launchpad_auth::{
    AuthCodeDriver, AuthEvidence, AuthOutcome, AuthRouter, CodeExchange, DeviceAuthorizationApi,
    DeviceCodeDriver, DriverFailure, ExpiringSessionStore, HostedLoginClient, IdentityDriver,
    IssuedChallenge, OidcDeviceClient, SessionStore,
};
use launchpad_core::{AuthType, DeploymentSession, OrchestratorConfig, OrchestratorError, SessionId};
use launchpad_deploy::{
    AwsCli, AwsRuntimeProvisioner, DelegatedSessionOpener, DeploymentExecutor, RuntimeProvisioner,
    StsDelegatedSessionOpener,
};
use launchpad_sandbox::{
    AgentCoreCli, ContainerRuntime, ContainerSandbox, DockerCli, ManagedRuntimeCli, ManagedSandbox,
    SandboxDispatcher,
};
use std::sync::Arc;
use std::time::Duration;

/// Every external collaborator the orchestrator talks to
#[derive(Clone)]
pub struct Ports {
    pub container: Arc<dyn ContainerRuntime>,
    pub managed: Arc<dyn ManagedRuntimeCli>,
    pub device: Arc<dyn DeviceAuthorizationApi>,
    /// Absent when no hosted-login provider is configured
    pub exchange: Option<Arc<dyn CodeExchange>>,
    pub shared: Arc<dyn RuntimeProvisioner>,
    pub tenant: Arc<dyn RuntimeProvisioner>,
    pub delegation: Arc<dyn DelegatedSessionOpener>,
}

impl Ports {
    /// Production adapters: container CLI, managed runtime CLI, OIDC and
    /// hosted-login HTTP clients, cloud CLI
    ///
    /// # Errors
    /// `OrchestratorError::Config` if an HTTP client cannot be built
    pub fn from_config(config: &OrchestratorConfig) -> Result<Self, OrchestratorError> {
        let device = OidcDeviceClient::new(config.identity.device.clone())
            .map_err(|e| OrchestratorError::Config(e.to_string()))?;
        let exchange = match &config.identity.hosted {
            Some(hosted) => {
                let timeout = Duration::from_secs(config.identity.device.request_timeout_secs);
                let client = HostedLoginClient::new(hosted.clone(), timeout)
                    .map_err(|e| OrchestratorError::Config(e.to_string()))?;
                Some(Arc::new(client) as Arc<dyn CodeExchange>)
            }
            None => None,
        };
        let cli = AwsCli::from_config(&config.deploy);
        let platform: Arc<dyn RuntimeProvisioner> =
            Arc::new(AwsRuntimeProvisioner::new(cli.clone()));

        Ok(Self {
            container: Arc::new(DockerCli::new(&config.sandbox.container_binary)),
            managed: Arc::new(AgentCoreCli::from_config(&config.sandbox)),
            device: Arc::new(device),
            exchange,
            shared: platform.clone(),
            tenant: platform,
            delegation: Arc::new(StsDelegatedSessionOpener::new(
                cli,
                config.deploy.delegated_session_secs,
                &config.deploy.sso_role_name,
            )),
        })
    }
}

/// Handler over `ports` with an expiring session store sized from config
#[must_use]
pub fn build_handler(config: &OrchestratorConfig, ports: Ports) -> RequestHandler {
    build_handler_with_store(
        config,
        ports,
        Arc::new(ExpiringSessionStore::from_config(&config.session)),
    )
}

#[must_use]
pub fn build_handler_with_store(
    config: &OrchestratorConfig,
    ports: Ports,
    store: Arc<dyn SessionStore>,
) -> RequestHandler {
    let sandbox = SandboxDispatcher::new(
        Arc::new(ContainerSandbox::new(ports.container, config.sandbox.clone())),
        Arc::new(ManagedSandbox::new(ports.managed, config.sandbox.clone())),
    );

    let device: Arc<dyn IdentityDriver> = Arc::new(DeviceCodeDriver::new(ports.device));
    let hosted: Arc<dyn IdentityDriver> = match (&config.identity.hosted, ports.exchange) {
        (Some(hosted), Some(exchange)) => Arc::new(AuthCodeDriver::new(hosted.clone(), exchange)),
        _ => {
            tracing::warn!("hosted login is not configured; managed sign-in is disabled");
            Arc::new(UnconfiguredLogin)
        }
    };
    let auth = AuthRouter::new(store, device, hosted);

    let executor = DeploymentExecutor::new(
        ports.shared,
        ports.tenant,
        ports.delegation,
        config.deploy.clone(),
    );
    RequestHandler::new(sandbox, auth, executor)
}

/// Stand-in for the hosted-login flow when no provider is configured
struct UnconfiguredLogin;

const UNCONFIGURED: &str = "hosted login provider is not configured";

#[async_trait::async_trait]
impl IdentityDriver for UnconfiguredLogin {
    fn auth_type(&self) -> AuthType {
        AuthType::AuthCode
    }

    async fn begin(&self, _session_id: &SessionId) -> Result<IssuedChallenge, DriverFailure> {
        Err(DriverFailure(UNCONFIGURED.to_string()))
    }

    async fn complete(
        &self,
        _session: &DeploymentSession,
        _evidence: &AuthEvidence,
    ) -> AuthOutcome {
        AuthOutcome::Failed(UNCONFIGURED.to_string())
    }
}
