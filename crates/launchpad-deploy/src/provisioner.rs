//! Runtime provisioning port

use crate::error::ProvisionError;
use serde::Serialize;
use std::collections::BTreeMap;

/// Everything the control plane needs to create an agent runtime
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuntimeRequest {
    pub runtime_name: String,
    pub container_uri: String,
    pub execution_role_arn: String,
    pub network_mode: String,
    pub tags: BTreeMap<String, String>,
}

/// Created runtime
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionedRuntime {
    pub runtime_arn: String,
    pub endpoint: Option<String>,
}

/// Agent runtime control plane
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait RuntimeProvisioner: Send + Sync {
    async fn create_runtime(&self, request: &RuntimeRequest)
        -> Result<ProvisionedRuntime, ProvisionError>;
}
