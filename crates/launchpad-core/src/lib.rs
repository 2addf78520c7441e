//! Launchpad Core
//!
//! Shared vocabulary for the deployment and authentication orchestrator:
//! - Agent descriptors built from raw user input
//! - Sandbox test outcomes
//! - Deployment sessions, targets and results
//! - The error taxonomy every component boundary converts into
//! - Orchestrator configuration
//! - External command execution for the CLI adapters
//!
//! # Example
//!
//! ```rust,ignore
//! use launchpad_core::{AgentConfigBuilder, ModelFamily};
//!
//! let raw = serde_json::json!({
//!     "name": "helper",
//!     "systemPrompt": "You are helpful.",
//!     "modelType": "ollama",
//!     "modelId": "llama3",
//!     "userId": "u-1",
//! });
//! let descriptor = AgentConfigBuilder::new().build(raw.as_object().unwrap())?;
//! assert_eq!(descriptor.model_family, ModelFamily::LocalContainer);
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod builder;
pub mod config;
pub mod error;
pub mod naming;
pub mod process;
pub mod types;

pub use builder::AgentConfigBuilder;
pub use config::{
    DeployConfig, DeviceFlowConfig, HostedLoginConfig, IdentityConfig, LoggingConfig,
    OrchestratorConfig, SandboxConfig, SessionConfig,
};
pub use error::{OrchestratorError, Result};
pub use process::{run_command, CommandError, CommandOutput, CommandSpec};
pub use types::{
    AgentDescriptor, AuthState, AuthType, Credentials, DeploymentPreference, DeploymentResult,
    DeploymentSession, DeploymentTarget, DeploymentTier, DescriptorId, ModelFamily,
    PendingChallenge, Principal, SandboxEnvironment, SessionId, TestOutcome,
};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with Launchpad Core
    pub use crate::{
        AgentConfigBuilder, AgentDescriptor, AuthState, AuthType, DeploymentResult,
        DeploymentSession, DeploymentTarget, ModelFamily, OrchestratorConfig, OrchestratorError,
        SessionId, TestOutcome,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
