//! Full invocations through `ToolClient` against in-process collaborators.

#![allow(clippy::panic, clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use chrono::Duration as ChronoDuration;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use toolgate_client::*;
use toolgate_core::*;
use toolgate_executor::*;
use toolgate_policy::*;
use toolgate_tools::*;

const CODE_REF: &str = "QmTransfer";

struct CountingBody {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl ToolFn for CountingBody {
    async fn call(&self, params: Value, _ctx: ToolBodyContext) -> Result<Value, BodyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(succeed(Some(json!({"txHash": format!("0x{}", params["amount"])}))))
    }
}

struct Limit;

#[async_trait]
impl PolicyFn for Limit {
    async fn call(&self, _args: PolicyArgs) -> Result<Value, BodyError> {
        Ok(deny(Some(json!({"reason": "limit exceeded"}))))
    }
}

struct Boom;

#[async_trait]
impl PolicyFn for Boom {
    async fn call(&self, _args: PolicyArgs) -> Result<Value, BodyError> {
        Err("boom".into())
    }
}

struct BalanceCheck;

#[async_trait]
impl ToolFn for BalanceCheck {
    async fn call(&self, params: Value, ctx: ToolBodyContext) -> Result<Value, BodyError> {
        let allowed = ctx.policies().map(|p| p.is_allowed()).unwrap_or(false);
        Ok(succeed(Some(json!({"sufficient": allowed, "amount": params["amount"]}))))
    }
}

fn amount_contract() -> SchemaContract {
    SchemaContract::new(json!({
        "type": "object",
        "properties": {"amount": {"type": "integer", "minimum": 1}},
        "required": ["amount"]
    }))
    .unwrap()
}

fn tx_contracts() -> ResultContracts {
    ResultContracts::new(
        Some(
            SchemaContract::new(json!({
                "type": "object",
                "properties": {"txHash": {"type": "string"}},
                "required": ["txHash"]
            }))
            .unwrap(),
        ),
        None,
    )
}

fn reason_contracts() -> ResultContracts {
    ResultContracts::new(
        None,
        Some(
            SchemaContract::new(json!({
                "type": "object",
                "properties": {"reason": {"type": "string"}},
                "required": ["reason"]
            }))
            .unwrap(),
        ),
    )
}

fn delegation() -> Delegation {
    Delegation::new("0xagent", "0xowner")
}

fn tool(calls: Arc<AtomicUsize>, slots: Vec<PolicySlot>) -> ToolSpec {
    ToolSpec::new("transfer", CODE_REF, CountingBody { calls })
        .with_params(amount_contract())
        .with_execute_contracts(tx_contracts())
        .with_policies(slots)
}

fn permissions(policies: &[&str]) -> Arc<InMemoryPermissionRegistry> {
    let registry = InMemoryPermissionRegistry::new();
    registry.grant(
        "0xagent",
        "0xowner",
        CODE_REF,
        PermissionResolution {
            app_id: 11,
            app_version: 3,
            policy_configurations: policies
                .iter()
                .map(|name| (name.to_string(), json!({})))
                .collect::<BTreeMap<_, _>>(),
        },
    );
    Arc::new(registry)
}

fn client_for(spec: ToolSpec, policies: &[&str]) -> (ToolClient, Arc<InProcessExecutionService>) {
    let mut tools = ToolRegistry::new();
    tools.register(spec.clone()).unwrap();
    let remote = Arc::new(InProcessExecutionService::new(Arc::new(tools)));
    let client = ToolClient::new(
        Arc::new(spec),
        permissions(policies),
        remote.clone(),
        Arc::new(StaticSessionProvider::new("token", ChronoDuration::minutes(5))),
    )
    .with_rpc_url("https://registry.example/rpc");
    (client, remote)
}

#[tokio::test]
async fn test_execute_denied_by_second_policy() {
    let calls = Arc::new(AtomicUsize::new(0));
    let spec = tool(
        calls.clone(),
        vec![
            PolicySlot::new("A", AllowAll),
            PolicySlot::new("B", Limit).with_evaluate_contracts(reason_contracts()),
        ],
    );
    let (client, remote) = client_for(spec, &["A", "B"]);

    let response = client.execute(json!({"amount": 5}), delegation()).await.unwrap();

    assert!(!response.is_success());
    let policies = response.context().policies_context().unwrap();
    assert!(!policies.is_allowed());
    assert_eq!(policies.evaluated_policies(), ["A", "B"]);
    let denied = policies.denied_policy().unwrap();
    assert_eq!(denied.package_name, "B");
    assert_eq!(denied.result.as_ref().unwrap()["reason"], json!("limit exceeded"));
    assert!(policies.allowed_policies().contains_key("A"));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(remote.invocations(), 1);
    assert_eq!(client.metrics().snapshot().policy_denials, 1);
}

#[tokio::test]
async fn test_execute_success_is_typed_and_bound() {
    let calls = Arc::new(AtomicUsize::new(0));
    let spec = tool(calls.clone(), vec![PolicySlot::new("A", AllowAll)]);
    let (client, _) = client_for(spec, &["A"]);

    let response = client.execute(json!({"amount": 5}), delegation()).await.unwrap();

    assert!(response.is_success());
    assert_eq!(response.result(), Some(&json!({"txHash": "0x5"})));
    assert_eq!(response.context().app_id(), Some(11));
    assert_eq!(response.context().app_version(), Some(3));
    assert_eq!(response.context().rpc_url(), Some("https://registry.example/rpc"));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_precheck_without_body_succeeds_without_result() {
    let calls = Arc::new(AtomicUsize::new(0));
    let spec = tool(
        calls.clone(),
        vec![
            PolicySlot::new("A", AllowAll).with_precheck(AllowAll),
            PolicySlot::new("B", Limit),
        ],
    );
    let (client, remote) = client_for(spec, &["A", "B"]);

    let response = client.precheck(json!({"amount": 5}), delegation()).await.unwrap();

    assert!(response.is_success());
    assert!(response.result().is_none());
    let policies = response.context().policies_context().unwrap();
    // B has no precheck: it is recorded as evaluated but never consulted.
    assert_eq!(policies.evaluated_policies(), ["A", "B"]);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(remote.invocations(), 0);
}

#[tokio::test]
async fn test_precheck_policy_error_becomes_deny() {
    let calls = Arc::new(AtomicUsize::new(0));
    let spec = tool(
        calls,
        vec![PolicySlot::new("A", AllowAll).with_precheck(Boom)],
    );
    let (client, _) = client_for(spec, &["A"]);

    let response = client.precheck(json!({"amount": 5}), delegation()).await.unwrap();

    assert!(!response.is_success());
    let policies = response.context().policies_context().unwrap();
    assert!(!policies.is_allowed());
    let denied = policies.denied_policy().unwrap();
    assert_eq!(denied.package_name, "A");
    assert!(denied.runtime_error.as_deref().unwrap().contains("boom"));
}

#[tokio::test]
async fn test_precheck_body_output_validated() {
    let calls = Arc::new(AtomicUsize::new(0));
    let sufficient = SchemaContract::new(json!({
        "type": "object",
        "properties": {"sufficient": {"type": "boolean"}},
        "required": ["sufficient"]
    }))
    .unwrap();
    let spec = tool(calls, vec![])
        .with_precheck(BalanceCheck)
        .with_precheck_contracts(ResultContracts::new(Some(sufficient), None));
    let (client, _) = client_for(spec, &[]);

    let response = client.precheck(json!({"amount": 9}), delegation()).await.unwrap();

    assert!(response.is_success());
    assert_eq!(response.result(), Some(&json!({"sufficient": true, "amount": 9})));
}

#[tokio::test]
async fn test_precheck_body_malformed_output() {
    let strict = SchemaContract::new(json!({
        "type": "object",
        "properties": {"sufficient": {"type": "string"}},
        "required": ["sufficient"]
    }))
    .unwrap();
    let spec = tool(Arc::new(AtomicUsize::new(0)), vec![])
        .with_precheck(BalanceCheck)
        .with_precheck_contracts(ResultContracts::new(Some(strict), None));
    let (client, _) = client_for(spec, &[]);

    let response = client.precheck(json!({"amount": 9}), delegation()).await.unwrap();

    let schema_error = response.schema_validation_error().unwrap();
    assert_eq!(schema_error.phase, Phase::Precheck);
    assert_eq!(schema_error.stage, Stage::Output);
    assert_eq!(client.metrics().snapshot().schema_failures, 1);
}

#[tokio::test]
async fn test_invalid_params_short_circuit_with_minimal_context() {
    let calls = Arc::new(AtomicUsize::new(0));
    let spec = tool(calls.clone(), vec![PolicySlot::new("A", AllowAll)]);
    let (client, remote) = client_for(spec, &["A"]);

    let response = client.execute(json!({"amount": 0}), delegation()).await.unwrap();

    assert!(!response.is_success());
    let schema_error = response.schema_validation_error().unwrap();
    assert_eq!(schema_error.phase, Phase::Execute);
    assert_eq!(schema_error.stage, Stage::Input);
    assert_eq!(response.context().tool_code_ref(), CODE_REF);
    assert!(response.context().app_id().is_none());
    assert!(response.context().rpc_url().is_none());
    assert!(response.context().policies_context().is_none());
    assert_eq!(remote.invocations(), 0);
}

#[tokio::test]
async fn test_registry_failure_is_fatal() {
    let spec = tool(Arc::new(AtomicUsize::new(0)), vec![]);
    let (client, remote) = client_for(spec, &[]);

    let err = client
        .precheck(json!({"amount": 1}), Delegation::new("0xstranger", "0xowner"))
        .await
        .unwrap_err();

    assert!(matches!(err, InvocationError::Registry(_)));
    assert_eq!(remote.invocations(), 0);
    assert_eq!(client.metrics().snapshot().fatal_errors, 1);
}

#[tokio::test]
async fn test_unsupported_policy_configuration_is_fatal() {
    let spec = tool(Arc::new(AtomicUsize::new(0)), vec![PolicySlot::new("A", AllowAll)]);
    let (client, _) = client_for(spec, &["A", "Unknown"]);

    let err = client.execute(json!({"amount": 1}), delegation()).await.unwrap_err();

    assert_eq!(
        err,
        InvocationError::UnsupportedPolicy {
            tool: "transfer".to_string(),
            policy: "Unknown".to_string(),
        }
    );
}

#[tokio::test]
async fn test_expired_session_is_fatal() {
    let spec = tool(Arc::new(AtomicUsize::new(0)), vec![]);
    let mut tools = ToolRegistry::new();
    tools.register(spec.clone()).unwrap();
    let client = ToolClient::new(
        Arc::new(spec),
        permissions(&[]),
        Arc::new(InProcessExecutionService::new(Arc::new(tools))),
        Arc::new(StaticSessionProvider::new("token", ChronoDuration::zero())),
    );

    let err = client.execute(json!({"amount": 1}), delegation()).await.unwrap_err();
    assert!(matches!(err, InvocationError::Credentials(_)));
}

#[tokio::test]
async fn test_concurrent_invocations_share_nothing() {
    let calls = Arc::new(AtomicUsize::new(0));
    let spec = tool(calls.clone(), vec![PolicySlot::new("A", AllowAll)]);
    let (client, _) = client_for(spec, &["A"]);
    let client = Arc::new(client);

    let handles: Vec<_> = (1..=8)
        .map(|amount| {
            let client = client.clone();
            tokio::spawn(async move {
                client
                    .execute(json!({"amount": amount}), delegation())
                    .await
                    .unwrap()
            })
        })
        .collect();

    for (index, handle) in handles.into_iter().enumerate() {
        let response = handle.await.unwrap();
        assert_eq!(
            response.result(),
            Some(&json!({"txHash": format!("0x{}", index + 1)}))
        );
    }
    assert_eq!(calls.load(Ordering::SeqCst), 8);
    assert_eq!(client.metrics().snapshot().executions, 8);
}

#[tokio::test]
async fn test_shutdown_releases_shared_connection() {
    let spec = tool(Arc::new(AtomicUsize::new(0)), vec![]);
    let connection = Arc::new(RemoteConnection::new(Duration::from_millis(200)));
    let remote = HttpExecutionService::new("http://127.0.0.1:9/execute", connection.clone());
    let client = ToolClient::new(
        Arc::new(spec),
        permissions(&[]),
        Arc::new(remote),
        Arc::new(StaticSessionProvider::new("token", ChronoDuration::minutes(1))),
    );

    // Nothing listens there: the call fails, but it opens the connection.
    let err = client.execute(json!({"amount": 1}), delegation()).await.unwrap_err();
    assert!(matches!(err, InvocationError::RemoteFailed(_)));
    assert!(connection.is_open());

    client.shutdown().await;
    assert!(!connection.is_open());
    client.shutdown().await;
    assert_eq!(connection.connections_opened(), 1);
}

#[tokio::test]
async fn test_client_from_config_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("toolgate.yaml");
    fs::write(
        &path,
        "rpc_url: https://registry.example/rpc\n\
         execution:\n  endpoint: https://exec.example/invoke\n  timeout_ms: 1000\n",
    )
    .unwrap();
    let config = load_client_config(path.to_str().unwrap()).unwrap();
    let connection = Arc::new(RemoteConnection::new(config.execution.timeout()));

    let client = ToolClient::from_config(
        Arc::new(tool(Arc::new(AtomicUsize::new(0)), vec![])),
        &config,
        connection.clone(),
        Arc::new(StaticSessionProvider::new("token", ChronoDuration::minutes(1))),
    )
    .unwrap();

    assert_eq!(client.tool().code_ref(), CODE_REF);
    assert!(!connection.is_open());
    client.shutdown().await;
}
