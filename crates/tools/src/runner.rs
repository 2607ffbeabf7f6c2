//! The code that runs inside the remote execution environment.
//!
//! It re-does everything the caller already did locally, with authority:
//! params validation, the policy chain in execute phase, then the execute
//! body, and packs the outcome into a [`RemoteEnvelope`].

use crate::spec::ToolSpec;
use crate::traits::ToolBodyContext;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use toolgate_core::{
    classify_and_validate, run_isolated, validate, Discriminant, InvocationContext,
    InvocationError, Outcome, Phase, RemoteEnvelope, Stage, ToolExecutionResult,
};
use toolgate_policy::CommitHandle;
use tracing::{debug, info, warn};

/// Parameters sent to the remote environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunnerParams {
    pub tool_params: Value,
    pub context: InvocationContext,
    #[serde(default)]
    pub policy_configurations: BTreeMap<String, Value>,
}

pub struct ToolRunner {
    tool: Arc<ToolSpec>,
}

impl ToolRunner {
    pub fn new(tool: Arc<ToolSpec>) -> Self {
        Self { tool }
    }

    pub fn tool(&self) -> &Arc<ToolSpec> {
        &self.tool
    }

    /// Decode raw remote params, run, and encode the envelope.
    pub async fn run_json(&self, params: Value) -> Result<Value, InvocationError> {
        let params: RunnerParams = serde_json::from_value(params)
            .map_err(|e| InvocationError::RemoteFailed(format!("Invalid runner params: {}", e)))?;
        let envelope = self.run(params).await?;
        serde_json::to_value(envelope)
            .map_err(|e| InvocationError::RemoteFailed(format!("Unencodable envelope: {}", e)))
    }

    pub async fn run(&self, params: RunnerParams) -> Result<RemoteEnvelope, InvocationError> {
        let tool = &self.tool;
        if params.context.tool_code_ref() != tool.code_ref() {
            return Err(InvocationError::ToolNotFound(
                params.context.tool_code_ref().to_string(),
            ));
        }
        tool.policies()
            .ensure_supported(tool.name(), &params.policy_configurations)?;
        // The verdict attached below is the only one the envelope may carry.
        if params.context.policies_context().is_some() {
            warn!("Rejecting params for {} that already carry a policy verdict", tool.name());
            return Err(InvocationError::RemoteFailed(
                "runner params already carry a policy evaluation".to_string(),
            ));
        }

        let context = params.context;
        info!("Running tool {} remotely", tool.name());

        let tool_params = match validate(
            params.tool_params,
            tool.params_contract(),
            Phase::Execute,
            Stage::Input,
        ) {
            Ok(validated) => validated.into_inner(),
            Err(err) => {
                warn!("Remote params rejected for {}: {}", tool.name(), err);
                return Ok(RemoteEnvelope {
                    tool_execution_result: ToolExecutionResult::failure(None)
                        .with_schema_error(err),
                    tool_context: context,
                });
            }
        };

        let policies = tool
            .policies()
            .evaluate(
                Phase::Execute,
                &tool_params,
                &params.policy_configurations,
                &context,
            )
            .await;
        let denied = !policies.is_allowed();
        let context = context.with_policies(policies);

        if denied {
            info!("Policies denied {}; execute body not invoked", tool.name());
            return Ok(RemoteEnvelope {
                tool_execution_result: ToolExecutionResult::failure(None),
                tool_context: context,
            });
        }

        let commits = CommitHandle::new(
            tool.policies().clone(),
            params.policy_configurations,
            context.clone(),
        );
        let body_ctx = ToolBodyContext::execute(context.clone(), commits);
        let execute = tool.execute_fn();
        let label = format!("tool {} execute", tool.name());

        debug!("Invoking execute body of {}", tool.name());
        let raw = match run_isolated(&label, async move { execute.call(tool_params, body_ctx).await })
            .await
        {
            Ok(raw) => raw,
            Err(message) => {
                warn!("Execute body of {} raised: {}", tool.name(), message);
                return Ok(RemoteEnvelope {
                    tool_execution_result: ToolExecutionResult::failure(None)
                        .with_runtime_error(Some(message)),
                    tool_context: context,
                });
            }
        };

        let result = match classify_and_validate(
            &raw,
            Discriminant::Success,
            tool.execute_contracts(),
            Phase::Execute,
            Stage::Output,
        ) {
            Ok(Outcome::Success(payload)) => {
                ToolExecutionResult::success(Some(payload.into_inner()))
            }
            Ok(Outcome::Failure { payload, error }) => {
                ToolExecutionResult::failure(Some(payload.into_inner())).with_runtime_error(error)
            }
            Err(err) => ToolExecutionResult::failure(None).with_schema_error(err),
        };

        Ok(RemoteEnvelope {
            tool_execution_result: result,
            tool_context: context,
        })
    }
}
