//! Launchpad Sandbox
//!
//! Test-phase dispatch of agent descriptors:
//! - `LocalContainer` models run in a throwaway container image
//! - `CloudManaged` models run on the managed agent runtime
//!
//! Both backends sit behind [`SandboxBackend`]; external tools are reached
//! through the [`ContainerRuntime`] and [`ManagedRuntimeCli`] ports.

pub mod container;
pub mod dispatcher;
pub mod error;
pub mod managed;
pub mod program;

pub use launchpad_core::process::{CommandOutput, CommandSpec};
pub use container::{ContainerRuntime, ContainerSandbox, DockerCli, RunRequest};
pub use dispatcher::{SandboxBackend, SandboxDispatcher};
pub use error::SandboxError;
pub use managed::{AgentCoreCli, ManagedRuntimeCli, ManagedSandbox};
