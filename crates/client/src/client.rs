//! Caller-facing entry points: `precheck`, `execute` and `shutdown`.

use crate::config::ClientConfig;
use crate::registry::RpcPermissionRegistry;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use toolgate_core::{
    classify_and_validate, run_isolated, validate, Delegation, Discriminant, InvocationContext,
    InvocationError, Metrics, Outcome, PermissionRegistry, Phase, RemoteExecutionService,
    SessionProvider, Stage, ToolResponse,
};
use toolgate_executor::{reconcile, HttpExecutionService, RemoteConnection};
use toolgate_tools::{RunnerParams, ToolBodyContext, ToolSpec};
use tracing::{debug, info, warn};

/// Invokes one tool on behalf of delegations.
///
/// Schema failures, denials and body errors come back as a [`ToolResponse`];
/// only conditions that keep the invocation from being adjudicated at all are
/// returned as [`InvocationError`].
pub struct ToolClient {
    tool: Arc<ToolSpec>,
    registry: Arc<dyn PermissionRegistry>,
    remote: Arc<dyn RemoteExecutionService>,
    sessions: Arc<dyn SessionProvider>,
    metrics: Arc<Metrics>,
    rpc_url: Option<String>,
}

impl ToolClient {
    pub fn new(
        tool: Arc<ToolSpec>,
        registry: Arc<dyn PermissionRegistry>,
        remote: Arc<dyn RemoteExecutionService>,
        sessions: Arc<dyn SessionProvider>,
    ) -> Self {
        Self {
            tool,
            registry,
            remote,
            sessions,
            metrics: Metrics::new(),
            rpc_url: None,
        }
    }

    /// Wire a client from configuration. `connection` is shared with every
    /// other client of the process.
    pub fn from_config(
        tool: Arc<ToolSpec>,
        config: &ClientConfig,
        connection: Arc<RemoteConnection>,
        sessions: Arc<dyn SessionProvider>,
    ) -> Result<Self, InvocationError> {
        let registry = RpcPermissionRegistry::new(&config.rpc_url, config.execution.timeout())?;
        let remote = HttpExecutionService::new(&config.execution.endpoint, connection)
            .with_max_retries(config.execution.max_retries);

        Ok(Self::new(tool, Arc::new(registry), Arc::new(remote), sessions)
            .with_rpc_url(&config.rpc_url))
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_rpc_url(mut self, rpc_url: impl Into<String>) -> Self {
        self.rpc_url = Some(rpc_url.into());
        self
    }

    pub fn tool(&self) -> &Arc<ToolSpec> {
        &self.tool
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Local fast-path check. Has no side effects beyond the permission
    /// lookup and whatever policy prechecks do.
    pub async fn precheck(
        &self,
        raw_params: Value,
        delegation: Delegation,
    ) -> Result<ToolResponse, InvocationError> {
        self.metrics.inc_prechecks();
        let outcome = self.run_precheck(raw_params, delegation).await;
        self.record(&outcome);
        outcome
    }

    /// Authoritative execution in the remote environment.
    pub async fn execute(
        &self,
        raw_params: Value,
        delegation: Delegation,
    ) -> Result<ToolResponse, InvocationError> {
        self.metrics.inc_executions();
        let outcome = self.run_execute(raw_params, delegation).await;
        self.record(&outcome);
        outcome
    }

    /// Release the shared remote connection. In-flight invocations finish;
    /// the next one reopens it.
    pub async fn shutdown(&self) {
        info!("Shutting down remote execution for {}", self.tool.name());
        self.remote.shutdown().await;
    }

    async fn run_precheck(
        &self,
        raw_params: Value,
        delegation: Delegation,
    ) -> Result<ToolResponse, InvocationError> {
        let tool = &self.tool;
        info!("Precheck of {} for {}", tool.name(), delegation.delegatee);
        let context = InvocationContext::new(delegation, tool.code_ref());

        let params = match validate(raw_params, tool.params_contract(), Phase::Precheck, Stage::Input)
        {
            Ok(validated) => validated.into_inner(),
            Err(err) => {
                warn!("Params rejected for {}: {}", tool.name(), err);
                return Ok(ToolResponse::failed(context).with_schema_error(err));
            }
        };

        let (context, configurations) = self.lookup_permissions(context).await?;

        let policies = tool
            .policies()
            .evaluate(Phase::Precheck, &params, &configurations, &context)
            .await;
        let denied = !policies.is_allowed();
        let context = context.with_policies(policies);
        if denied {
            info!("Policies denied precheck of {}", tool.name());
            return Ok(ToolResponse::failed(context));
        }

        let Some(body) = tool.precheck_fn() else {
            debug!("{} has no precheck body", tool.name());
            return Ok(ToolResponse::succeeded(None, context));
        };

        let body_ctx = ToolBodyContext::precheck(context.clone());
        let label = format!("tool {} precheck", tool.name());
        debug!("Invoking precheck body of {}", tool.name());
        let raw = match run_isolated(&label, async move { body.call(params, body_ctx).await }).await
        {
            Ok(raw) => raw,
            Err(message) => {
                warn!("Precheck body of {} raised: {}", tool.name(), message);
                return Ok(ToolResponse::failed(context).with_runtime_error(message));
            }
        };

        let response = match classify_and_validate(
            &raw,
            Discriminant::Success,
            tool.precheck_contracts(),
            Phase::Precheck,
            Stage::Output,
        ) {
            Ok(Outcome::Success(payload)) => ToolResponse::succeeded(payload.into_typed(), context),
            Ok(Outcome::Failure { payload, error }) => {
                let response = ToolResponse::failed(context).with_result(payload.into_typed());
                match error {
                    Some(error) => response.with_runtime_error(error),
                    None => response,
                }
            }
            Err(err) => {
                warn!("Precheck output of {} failed its contract: {}", tool.name(), err);
                ToolResponse::failed(context).with_schema_error(err)
            }
        };
        Ok(response)
    }

    async fn run_execute(
        &self,
        raw_params: Value,
        delegation: Delegation,
    ) -> Result<ToolResponse, InvocationError> {
        let tool = &self.tool;
        info!("Execute of {} for {}", tool.name(), delegation.delegatee);
        let context = InvocationContext::new(delegation, tool.code_ref());

        let params = match validate(raw_params, tool.params_contract(), Phase::Execute, Stage::Input)
        {
            Ok(validated) => validated.into_inner(),
            Err(err) => {
                warn!("Params rejected for {}: {}", tool.name(), err);
                return Ok(ToolResponse::failed(context).with_schema_error(err));
            }
        };

        let (context, configurations) = self.lookup_permissions(context).await?;

        let credentials = self.sessions.issue(&context.delegation().delegatee).await?;
        if credentials.is_expired() {
            return Err(InvocationError::Credentials(format!(
                "credentials for {} already expired",
                credentials.signer
            )));
        }

        let runner_params = RunnerParams {
            tool_params: params,
            context: context.clone(),
            policy_configurations: configurations,
        };
        let js_params = serde_json::to_value(runner_params).map_err(|e| {
            InvocationError::RemoteFailed(format!("Failed to encode runner params: {}", e))
        })?;

        debug!("Dispatching {} to the execution service", tool.code_ref());
        let reply = self
            .remote
            .invoke(tool.code_ref(), &credentials, js_params)
            .await?;

        reconcile(reply, tool.execute_contracts(), &context)
    }

    /// Bind the app and rpc endpoint, and reject configurations for policies
    /// this tool does not declare.
    async fn lookup_permissions(
        &self,
        context: InvocationContext,
    ) -> Result<(InvocationContext, BTreeMap<String, Value>), InvocationError> {
        let delegation = context.delegation();
        let resolution = self
            .registry
            .resolve(&delegation.delegatee, &delegation.delegator, context.tool_code_ref())
            .await
            .map_err(|e| {
                warn!("Permission lookup failed for {}: {}", self.tool.name(), e);
                e
            })?;
        debug!(
            "{} bound to app {} v{}",
            self.tool.name(),
            resolution.app_id,
            resolution.app_version
        );

        self.tool
            .policies()
            .ensure_supported(self.tool.name(), &resolution.policy_configurations)?;

        let mut context = context.with_app(resolution.app_id, resolution.app_version);
        if let Some(rpc_url) = &self.rpc_url {
            context = context.with_rpc_url(rpc_url);
        }
        Ok((context, resolution.policy_configurations))
    }

    fn record(&self, outcome: &Result<ToolResponse, InvocationError>) {
        match outcome {
            Ok(response) => {
                if response.schema_validation_error().is_some() {
                    self.metrics.inc_schema_failures();
                }
                if response.context().policies_denied() {
                    self.metrics.inc_policy_denials();
                }
            }
            Err(_) => self.metrics.inc_fatal_errors(),
        }
    }
}
