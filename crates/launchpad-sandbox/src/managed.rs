//! Managed agent-runtime sandbox
//!
//! Drives the runtime's CLI through configure, launch and invoke in a
//! scratch directory holding the wrapped program.

use crate::dispatcher::SandboxBackend;
use crate::error::SandboxError;
use launchpad_core::process::{run_command, CommandOutput, CommandSpec};
use crate::program::{AgentBundle, ENTRYPOINT_FILE};
use launchpad_core::naming::runtime_name;
use launchpad_core::{
    AgentDescriptor, OrchestratorError, SandboxConfig, SandboxEnvironment, TestOutcome,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Managed runtime CLI port
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait ManagedRuntimeCli: Send + Sync {
    /// Run one CLI subcommand inside `workdir`
    async fn execute(&self, workdir: &Path, args: &[String]) -> Result<CommandOutput, SandboxError>;
}

/// `agentcore` CLI adapter
#[derive(Debug, Clone)]
pub struct AgentCoreCli {
    binary: String,
    step_timeout: Duration,
}

impl AgentCoreCli {
    #[must_use]
    pub fn new(binary: impl Into<String>, step_timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            step_timeout,
        }
    }

    #[must_use]
    pub fn from_config(config: &SandboxConfig) -> Self {
        Self::new(&config.managed_cli_binary, config.managed_step_timeout())
    }
}

#[async_trait::async_trait]
impl ManagedRuntimeCli for AgentCoreCli {
    async fn execute(
        &self,
        workdir: &Path,
        args: &[String],
    ) -> Result<CommandOutput, SandboxError> {
        let spec = CommandSpec::new(&self.binary)
            .args(args.iter().cloned())
            .with_cwd(workdir)
            .with_timeout(self.step_timeout);
        Ok(run_command(&spec).await?)
    }
}

/// Sandbox backend for cloud-managed models
pub struct ManagedSandbox {
    cli: Arc<dyn ManagedRuntimeCli>,
    config: SandboxConfig,
}

impl ManagedSandbox {
    #[must_use]
    pub fn new(cli: Arc<dyn ManagedRuntimeCli>, config: SandboxConfig) -> Self {
        Self { cli, config }
    }
}

fn steps(agent: &AgentDescriptor, prompt: &str) -> [Vec<String>; 3] {
    let name = runtime_name(&["test", &agent.owner_id, &agent.name]);
    let payload = serde_json::json!({ "prompt": prompt }).to_string();
    [
        vec![
            "configure".into(),
            "--entrypoint".into(),
            ENTRYPOINT_FILE.into(),
            "--name".into(),
            name,
        ],
        vec!["launch".into()],
        vec!["invoke".into(), payload],
    ]
}

#[async_trait::async_trait]
impl SandboxBackend for ManagedSandbox {
    fn environment(&self) -> SandboxEnvironment {
        SandboxEnvironment::ManagedSandbox
    }

    #[tracing::instrument(skip_all, fields(owner = %agent.owner_id, model = %agent.model_id))]
    async fn test(
        &self,
        agent: &AgentDescriptor,
        prompt: &str,
    ) -> Result<TestOutcome, OrchestratorError> {
        let env = SandboxEnvironment::ManagedSandbox;
        let scratch = match AgentBundle::for_managed(agent).stage(&self.config) {
            Ok(scratch) => scratch,
            Err(err) => {
                tracing::warn!(error = %err, "managed sandbox could not be prepared");
                return Ok(TestOutcome::failed(env, &agent.model_id, err.to_string(), ""));
            }
        };

        let mut last = CommandOutput::default();
        for args in steps(agent, prompt) {
            let step = format!("{} {}", self.config.managed_cli_binary, args[0]);
            match self.cli.execute(scratch.path(), &args).await {
                Ok(output) if output.succeeded() => last = output,
                Ok(output) => {
                    let err = SandboxError::Step {
                        step,
                        status: output.status_code.unwrap_or(-1),
                        output: output.stderr.trim().to_string(),
                    };
                    tracing::warn!(error = %err, "managed sandbox step failed");
                    return Ok(TestOutcome::failed(
                        env,
                        &agent.model_id,
                        err.to_string(),
                        output.combined(),
                    ));
                }
                Err(err) => {
                    tracing::warn!(error = %err, step = %step, "managed sandbox step failed");
                    return Ok(TestOutcome::failed(env, &agent.model_id, err.to_string(), ""));
                }
            }
        }

        tracing::info!("managed sandbox finished");
        Ok(TestOutcome::passed(env, &agent.model_id, last.stdout.trim()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use launchpad_core::{DescriptorId, ModelFamily};
    use mockall::Sequence;

    fn agent() -> AgentDescriptor {
        AgentDescriptor {
            id: DescriptorId::new(),
            name: "helper".into(),
            system_prompt: "Be brief.".into(),
            tool_names: Default::default(),
            model_family: ModelFamily::CloudManaged,
            model_id: "anthropic.claude-3-haiku-20240307-v1:0".into(),
            owner_id: "u-1".into(),
            created_at: chrono::Utc::now(),
        }
    }

    fn ok(stdout: &str) -> CommandOutput {
        CommandOutput {
            status_code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    #[tokio::test]
    async fn runs_configure_launch_invoke_in_order() {
        let mut cli = MockManagedRuntimeCli::new();
        let mut seq = Sequence::new();
        cli.expect_execute()
            .withf(|dir, args| {
                dir.join(ENTRYPOINT_FILE).exists()
                    && args[0] == "configure"
                    && args.last().map(String::as_str) == Some("test_u_1_helper")
            })
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(ok("configured")));
        cli.expect_execute()
            .withf(|_, args| args == ["launch".to_string()])
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(ok("launched")));
        cli.expect_execute()
            .withf(|_, args| args[0] == "invoke" && args[1] == r#"{"prompt":"hello"}"#)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(ok("{\"message\": \"hi\"}\n")));

        let sandbox = ManagedSandbox::new(Arc::new(cli), SandboxConfig::default());
        let outcome = sandbox.test(&agent(), "hello").await.unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.environment, SandboxEnvironment::ManagedSandbox);
        assert_eq!(outcome.raw_response, "{\"message\": \"hi\"}");
    }

    #[tokio::test]
    async fn failed_launch_aborts_invoke() {
        let mut cli = MockManagedRuntimeCli::new();
        cli.expect_execute()
            .withf(|_, args| args[0] == "configure")
            .returning(|_, _| Ok(ok("")));
        cli.expect_execute()
            .withf(|_, args| args[0] == "launch")
            .returning(|_, _| {
                Ok(CommandOutput {
                    status_code: Some(2),
                    stdout: String::new(),
                    stderr: "AccessDenied".into(),
                })
            });
        cli.expect_execute()
            .withf(|_, args| args[0] == "invoke")
            .times(0);

        let sandbox = ManagedSandbox::new(Arc::new(cli), SandboxConfig::default());
        let outcome = sandbox.test(&agent(), "hello").await.unwrap();
        assert!(!outcome.success);
        let error = outcome.error.unwrap();
        assert!(error.contains("agentcore launch"), "{error}");
        assert!(error.contains("AccessDenied"), "{error}");
    }

    #[tokio::test]
    async fn spawn_failure_is_failed_outcome() {
        let mut cli = MockManagedRuntimeCli::new();
        cli.expect_execute().times(1).returning(|_, _| {
            Err(SandboxError::Spawn {
                program: "agentcore".into(),
                reason: "not found".into(),
            })
        });

        let sandbox = ManagedSandbox::new(Arc::new(cli), SandboxConfig::default());
        let outcome = sandbox.test(&agent(), "hello").await.unwrap();
        assert!(!outcome.success);
        assert!(outcome.raw_response.is_empty());
    }

    #[tokio::test]
    async fn unwritable_scratch_skips_the_cli() {
        let mut cli = MockManagedRuntimeCli::new();
        cli.expect_execute().times(0);
        let file = tempfile::NamedTempFile::new().unwrap();
        let config = SandboxConfig {
            scratch_root: Some(file.path().join("nested")),
            ..SandboxConfig::default()
        };

        let outcome = ManagedSandbox::new(Arc::new(cli), config)
            .test(&agent(), "hello")
            .await
            .unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.environment, SandboxEnvironment::ManagedSandbox);
        assert!(outcome.error.unwrap().contains("scratch directory"));
    }
}
