//! Delegated access into a user's own account

use crate::error::ProvisionError;
use crate::provisioner::RuntimeProvisioner;
use launchpad_core::{Credentials, Principal};
use std::sync::Arc;

/// Opens a provisioner scoped to the user's account.
///
/// The temporary credentials live only inside the returned provisioner and
/// are never written back to the session.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait DelegatedSessionOpener: Send + Sync {
    async fn open(
        &self,
        credentials: &Credentials,
        principal: &Principal,
        role_arn: &str,
        external_id: &str,
    ) -> Result<Arc<dyn RuntimeProvisioner>, ProvisionError>;
}

/// Account id field of an IAM role ARN
#[must_use]
pub fn account_id(role_arn: &str) -> Option<&str> {
    let mut parts = role_arn.split(':');
    match (parts.next(), parts.nth(3), parts.next()) {
        (Some("arn"), Some(account), Some(resource))
            if !account.is_empty() && resource.starts_with("role/") =>
        {
            Some(account)
        }
        _ => None,
    }
}
