//! Deployment executor
//!
//! Turns an agent descriptor plus a deployment target into one runtime
//! creation call on the provisioner that owns that tier. Authentication is
//! checked before anything external is touched.

use crate::delegation::{account_id, DelegatedSessionOpener};
use crate::error::ProvisionError;
use crate::provisioner::{RuntimeProvisioner, RuntimeRequest};
use launchpad_core::naming::{image_tag, runtime_name};
use launchpad_core::{
    AgentDescriptor, Credentials, DeployConfig, DeploymentResult, DeploymentSession,
    DeploymentTarget, DeploymentTier, OrchestratorError, Principal,
};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Production deployment router
pub struct DeploymentExecutor {
    shared: Arc<dyn RuntimeProvisioner>,
    tenant: Arc<dyn RuntimeProvisioner>,
    delegation: Arc<dyn DelegatedSessionOpener>,
    config: DeployConfig,
}

impl DeploymentExecutor {
    #[must_use]
    pub fn new(
        shared: Arc<dyn RuntimeProvisioner>,
        tenant: Arc<dyn RuntimeProvisioner>,
        delegation: Arc<dyn DelegatedSessionOpener>,
        config: DeployConfig,
    ) -> Self {
        Self {
            shared,
            tenant,
            delegation,
            config,
        }
    }

    /// Image the artifact producer published for this agent
    #[must_use]
    pub fn container_uri(&self, agent: &AgentDescriptor) -> String {
        format!(
            "{}/{}:latest",
            self.config.container_registry.trim_end_matches('/'),
            image_tag("agent", &format!("{}-{}", agent.owner_id, agent.name)),
        )
    }

    /// Deploy `agent` to `target`
    ///
    /// Provider faults come back as `DeploymentResult { success: false, .. }`.
    ///
    /// # Errors
    /// - `OrchestratorError::NotAuthenticated` when a non-shared tier is asked
    ///   for without an authenticated session
    /// - `OrchestratorError::InvalidConfig` when a managed tenant other than
    ///   the signed-in principal's is named
    ///
    /// Nothing external is called in either case.
    #[tracing::instrument(skip_all, fields(agent = %agent.name, tier = %target.tier()))]
    pub async fn deploy(
        &self,
        session: Option<&DeploymentSession>,
        agent: &AgentDescriptor,
        target: &DeploymentTarget,
    ) -> Result<DeploymentResult, OrchestratorError> {
        let tier = target.tier();
        let result = match target {
            DeploymentTarget::SharedPlatform => self.deploy_shared(agent).await,
            DeploymentTarget::UserAccount {
                role_arn,
                external_id,
            } => {
                let (credentials, principal) = authenticated(session)?;
                self.deploy_user_account(agent, credentials, principal, role_arn, external_id)
                    .await
            }
            DeploymentTarget::ManagedTenant { tenant_id } => {
                let (_, principal) = authenticated(session)?;
                let tenant = tenant_namespace(principal, tenant_id.as_deref())?;
                self.deploy_tenant(agent, principal, tenant).await
            }
        };

        let result = result.unwrap_or_else(|err| {
            tracing::warn!(error = %err, "deployment failed");
            DeploymentResult::failed(tier, err.to_string())
        });
        if result.success {
            tracing::info!(runtime = ?result.runtime_handle, "agent deployed");
        }
        Ok(result)
    }

    fn request(
        &self,
        agent: &AgentDescriptor,
        runtime_name: String,
        execution_role_arn: String,
        tags: BTreeMap<String, String>,
    ) -> RuntimeRequest {
        RuntimeRequest {
            runtime_name,
            container_uri: self.container_uri(agent),
            execution_role_arn,
            network_mode: self.config.network_mode.clone(),
            tags,
        }
    }

    async fn deploy_shared(
        &self,
        agent: &AgentDescriptor,
    ) -> Result<DeploymentResult, ProvisionError> {
        let request = self.request(
            agent,
            runtime_name(&[&agent.owner_id, &agent.name]),
            self.config.platform_execution_role_arn.clone(),
            BTreeMap::from([("OwnerId".to_string(), agent.owner_id.clone())]),
        );
        let runtime = self.shared.create_runtime(&request).await?;
        Ok(DeploymentResult::deployed(
            DeploymentTier::SharedPlatform,
            runtime.runtime_arn,
            runtime.endpoint,
            format!("Agent '{}' deployed to the shared platform", agent.name),
        ))
    }

    async fn deploy_user_account(
        &self,
        agent: &AgentDescriptor,
        credentials: &Credentials,
        principal: &Principal,
        role_arn: &str,
        external_id: &str,
    ) -> Result<DeploymentResult, ProvisionError> {
        let tier = DeploymentTier::UserAccount;
        let Some(account) = account_id(role_arn) else {
            return Ok(DeploymentResult::failed(
                tier,
                format!("failed to assume delegated role {role_arn}: not a role ARN"),
            ));
        };
        let provisioner = match self
            .delegation
            .open(credentials, principal, role_arn, external_id)
            .await
        {
            Ok(provisioner) => provisioner,
            Err(err) => {
                tracing::warn!(error = %err, %role_arn, "delegated role assumption failed");
                return Ok(DeploymentResult::failed(
                    tier,
                    format!("failed to assume delegated role {role_arn}: {err}"),
                ));
            }
        };

        let request = self.request(
            agent,
            runtime_name(&[&agent.name, "production"]),
            format!(
                "arn:aws:iam::{account}:role/{}",
                self.config.user_execution_role_name
            ),
            BTreeMap::from([("OwnerId".to_string(), agent.owner_id.clone())]),
        );
        let runtime = provisioner.create_runtime(&request).await?;
        Ok(DeploymentResult::deployed(
            tier,
            runtime.runtime_arn,
            runtime.endpoint,
            format!("Agent '{}' deployed to your account", agent.name),
        ))
    }

    async fn deploy_tenant(
        &self,
        agent: &AgentDescriptor,
        principal: &Principal,
        tenant_id: &str,
    ) -> Result<DeploymentResult, ProvisionError> {
        let mut tags = BTreeMap::from([
            ("TenantId".to_string(), tenant_id.to_string()),
            ("UserId".to_string(), principal.user_id.clone()),
            ("OwnerId".to_string(), agent.owner_id.clone()),
        ]);
        if let Some(email) = &principal.email {
            tags.insert("UserEmail".to_string(), email.clone());
        }
        let request = self.request(
            agent,
            runtime_name(&[tenant_id, &agent.name]),
            self.config.tenant_execution_role_arn.clone(),
            tags,
        );
        let runtime = self.tenant.create_runtime(&request).await?;
        Ok(DeploymentResult::deployed(
            DeploymentTier::ManagedTenant,
            runtime.runtime_arn,
            Some(format!(
                "{}/agents/{tenant_id}/{}",
                self.config.managed_endpoint_base.trim_end_matches('/'),
                agent.name
            )),
            format!("Agent '{}' deployed to your managed environment", agent.name),
        ))
    }
}

/// Credentials and principal of an authenticated session
fn authenticated(
    session: Option<&DeploymentSession>,
) -> Result<(&Credentials, &Principal), OrchestratorError> {
    let granted = session
        .filter(|s| s.is_authenticated())
        .and_then(|s| s.credentials.as_ref().zip(s.principal.as_ref()));
    granted.ok_or_else(|| OrchestratorError::NotAuthenticated {
        session_id: session.map(|s| s.session_id.clone()),
    })
}

/// Tenant namespace of the signed-in principal
///
/// Tenants are keyed by user id, so a caller can only ever name its own.
fn tenant_namespace<'a>(
    principal: &'a Principal,
    requested: Option<&str>,
) -> Result<&'a str, OrchestratorError> {
    let owned = principal.user_id.as_str();
    if owned.trim().is_empty() {
        return Err(OrchestratorError::invalid_config(
            "signed-in principal has no user id to namespace the tenant",
        ));
    }
    match requested {
        Some(tenant) if tenant != owned => {
            tracing::warn!(
                requested = %tenant,
                principal = %owned,
                "tenant does not match principal"
            );
            Err(OrchestratorError::invalid_config(format!(
                "tenant '{tenant}' does not belong to the signed-in user"
            )))
        }
        _ => Ok(owned),
    }
}
