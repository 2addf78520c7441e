//! Container sandbox
//!
//! Builds a per-owner image from the synthesized bundle, runs it once with
//! the prompt, and always tears the container and image down afterwards.
//! Each run gets its own image tag, so concurrent runs for one owner never
//! remove each other's image.

use crate::dispatcher::SandboxBackend;
use crate::error::SandboxError;
use launchpad_core::process::{run_command, CommandOutput, CommandSpec};
use crate::program::AgentBundle;
use futures::FutureExt;
use launchpad_core::naming::image_tag;
use launchpad_core::{
    AgentDescriptor, OrchestratorError, SandboxConfig, SandboxEnvironment, TestOutcome,
};
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use ulid::Ulid;

/// One container run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    pub image: String,
    pub container_name: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
}

/// Container runtime port
///
/// `teardown` must tolerate resources that were never created.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Build `context` into an image tagged `tag`
    async fn build_image(&self, context: &Path, tag: &str) -> Result<(), SandboxError>;

    /// Run a container to completion; a non-zero exit is returned, not raised
    async fn run_once(&self, request: &RunRequest) -> Result<CommandOutput, SandboxError>;

    /// Remove the container and the image
    async fn teardown(&self, image: &str, container_name: &str) -> Result<(), SandboxError>;
}

/// `docker` CLI adapter
#[derive(Debug, Clone)]
pub struct DockerCli {
    binary: String,
}

impl DockerCli {
    #[must_use]
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new("docker")
    }
}

fn already_gone(output: &CommandOutput) -> bool {
    let stderr = output.stderr.to_ascii_lowercase();
    stderr.contains("no such container") || stderr.contains("no such image")
}

#[async_trait::async_trait]
impl ContainerRuntime for DockerCli {
    async fn build_image(&self, context: &Path, tag: &str) -> Result<(), SandboxError> {
        let spec = CommandSpec::new(&self.binary)
            .args(["build", "--rm", "-t", tag])
            .arg(context.to_string_lossy());
        let output = run_command(&spec).await?;
        if output.succeeded() {
            Ok(())
        } else {
            Err(SandboxError::Build(output.combined()))
        }
    }

    async fn run_once(&self, request: &RunRequest) -> Result<CommandOutput, SandboxError> {
        let mut spec =
            CommandSpec::new(&self.binary).args(["run", "--name", request.container_name.as_str()]);
        for (key, value) in &request.env {
            spec = spec.arg("-e").arg(format!("{key}={value}"));
        }
        let spec = spec.arg(&request.image).args(request.args.iter().cloned());
        Ok(run_command(&spec).await?)
    }

    async fn teardown(&self, image: &str, container_name: &str) -> Result<(), SandboxError> {
        let mut failures = Vec::new();
        for args in [["rm", "-f", container_name], ["rmi", "-f", image]] {
            let spec = CommandSpec::new(&self.binary).args(args);
            match run_command(&spec).await {
                Ok(output) if output.succeeded() || already_gone(&output) => {}
                Ok(output) => failures.push(format!("{}: {}", spec.label(), output.stderr.trim())),
                Err(err) => failures.push(err.to_string()),
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(SandboxError::Teardown(failures.join("; ")))
        }
    }
}

/// Sandbox backend for locally served models
pub struct ContainerSandbox {
    runtime: Arc<dyn ContainerRuntime>,
    config: SandboxConfig,
    build_timeout: Duration,
    run_timeout: Duration,
}

impl ContainerSandbox {
    #[must_use]
    pub fn new(runtime: Arc<dyn ContainerRuntime>, config: SandboxConfig) -> Self {
        Self {
            build_timeout: config.build_timeout(),
            run_timeout: config.run_timeout(),
            runtime,
            config,
        }
    }

    /// Override the build and run time budgets
    #[inline]
    #[must_use]
    pub fn with_timeouts(mut self, build: Duration, run: Duration) -> Self {
        self.build_timeout = build;
        self.run_timeout = run;
        self
    }

    async fn build_and_run(
        &self,
        context: &Path,
        request: &RunRequest,
    ) -> Result<CommandOutput, SandboxError> {
        tokio::time::timeout(
            self.build_timeout,
            self.runtime.build_image(context, &request.image),
        )
        .await
        .map_err(|_| SandboxError::Timeout {
            step: "image build".into(),
            after: self.build_timeout,
        })??;

        tokio::time::timeout(self.run_timeout, self.runtime.run_once(request))
            .await
            .map_err(|_| SandboxError::Timeout {
                step: "container run".into(),
                after: self.run_timeout,
            })?
    }
}

#[async_trait::async_trait]
impl SandboxBackend for ContainerSandbox {
    fn environment(&self) -> SandboxEnvironment {
        SandboxEnvironment::ContainerSandbox
    }

    #[tracing::instrument(skip_all, fields(owner = %agent.owner_id, model = %agent.model_id))]
    async fn test(
        &self,
        agent: &AgentDescriptor,
        prompt: &str,
    ) -> Result<TestOutcome, OrchestratorError> {
        let env = SandboxEnvironment::ContainerSandbox;
        let scratch = match AgentBundle::for_container(agent, &self.config).stage(&self.config) {
            Ok(scratch) => scratch,
            Err(err) => {
                tracing::warn!(error = %err, "container sandbox could not be prepared");
                return Ok(TestOutcome::failed(env, &agent.model_id, err.to_string(), ""));
            }
        };

        let repository = image_tag(&self.config.image_prefix, &agent.owner_id);
        let run_id = Ulid::new().to_string().to_ascii_lowercase();
        let request = RunRequest {
            container_name: format!("{repository}-{run_id}"),
            image: format!("{repository}:{run_id}"),
            args: vec![prompt.to_string()],
            env: vec![("OLLAMA_MODEL".to_string(), agent.model_id.clone())],
        };

        let lifecycle = AssertUnwindSafe(self.build_and_run(scratch.path(), &request))
            .catch_unwind()
            .await;

        if let Err(err) = self
            .runtime
            .teardown(&request.image, &request.container_name)
            .await
        {
            tracing::warn!(error = %err, image = %request.image, "container teardown failed");
        }

        let outcome = match lifecycle {
            Ok(Ok(output)) if output.succeeded() => {
                TestOutcome::passed(env, &agent.model_id, output.combined().trim())
            }
            Ok(Ok(output)) => {
                let status = output
                    .status_code
                    .map_or_else(|| "a signal".to_string(), |code| format!("status {code}"));
                TestOutcome::failed(
                    env,
                    &agent.model_id,
                    format!("agent exited with {status}"),
                    output.combined(),
                )
            }
            Ok(Err(err)) => TestOutcome::failed(env, &agent.model_id, err.to_string(), ""),
            Err(_) => TestOutcome::failed(env, &agent.model_id, "sandbox run panicked", ""),
        };

        tracing::info!(success = outcome.success, "container sandbox finished");
        Ok(outcome)
    }
}
