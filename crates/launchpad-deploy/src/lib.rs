//! Launchpad Deploy
//!
//! Production deployment of a tested agent into one of three tiers:
//! - Shared platform runtime owned by the platform
//! - The user's own account through a delegated role
//! - An isolated managed tenant environment
//!
//! [`DeploymentExecutor`] picks the tier; [`RuntimeProvisioner`] and
//! [`DelegatedSessionOpener`] are the ports to the cloud control plane.

pub mod aws;
pub mod delegation;
pub mod error;
pub mod executor;
pub mod provisioner;

pub use aws::{AwsCli, AwsRuntimeProvisioner, StsDelegatedSessionOpener, TemporaryCredentials};
pub use delegation::DelegatedSessionOpener;
pub use error::ProvisionError;
pub use executor::DeploymentExecutor;
pub use provisioner::{ProvisionedRuntime, RuntimeProvisioner, RuntimeRequest};
