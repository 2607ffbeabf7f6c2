use crate::policy_context::PolicyEvaluationContext;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Error type returned by user-supplied tool and policy bodies.
pub type BodyError = Box<dyn std::error::Error + Send + Sync>;

/// Which half of the invocation pipeline is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Precheck,
    Execute,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Precheck => write!(f, "precheck"),
            Phase::Execute => write!(f, "execute"),
        }
    }
}

/// Whether a contract guards data flowing in or results flowing out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Input,
    Output,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Input => write!(f, "input"),
            Stage::Output => write!(f, "output"),
        }
    }
}

/// A schema contract rejected a value.
///
/// `phase` and `stage` together identify which of the contracts failed.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("schema validation failed during {phase} {stage}: {}", .details.join("; "))]
pub struct SchemaValidationError {
    pub phase: Phase,
    pub stage: Stage,
    pub details: Vec<String>,
}

impl SchemaValidationError {
    pub fn new(phase: Phase, stage: Stage, details: Vec<String>) -> Self {
        Self {
            phase,
            stage,
            details,
        }
    }
}

/// Who is invoking the tool, and on whose behalf.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Delegation {
    pub delegatee: String,
    pub delegator: String,
}

impl Delegation {
    pub fn new(delegatee: impl Into<String>, delegator: impl Into<String>) -> Self {
        Self {
            delegatee: delegatee.into(),
            delegator: delegator.into(),
        }
    }
}

/// Per-invocation context, filled in as the pipeline advances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationContext {
    delegation: Delegation,
    tool_code_ref: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    app_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    app_version: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    rpc_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    policies_context: Option<PolicyEvaluationContext>,
}

impl InvocationContext {
    pub fn new(delegation: Delegation, tool_code_ref: impl Into<String>) -> Self {
        Self {
            delegation,
            tool_code_ref: tool_code_ref.into(),
            app_id: None,
            app_version: None,
            rpc_url: None,
            policies_context: None,
        }
    }

    pub fn with_rpc_url(mut self, rpc_url: impl Into<String>) -> Self {
        self.rpc_url.get_or_insert_with(|| rpc_url.into());
        self
    }

    /// Bind the application resolved by the permission registry. Only the first binding sticks.
    pub fn with_app(mut self, app_id: u64, app_version: u64) -> Self {
        if self.app_id.is_none() {
            self.app_id = Some(app_id);
            self.app_version = Some(app_version);
        }
        self
    }

    /// Attach the policy evaluation outcome. Only the first outcome sticks.
    pub fn with_policies(mut self, policies: PolicyEvaluationContext) -> Self {
        self.policies_context.get_or_insert(policies);
        self
    }

    pub fn delegation(&self) -> &Delegation {
        &self.delegation
    }

    pub fn tool_code_ref(&self) -> &str {
        &self.tool_code_ref
    }

    pub fn app_id(&self) -> Option<u64> {
        self.app_id
    }

    pub fn app_version(&self) -> Option<u64> {
        self.app_version
    }

    pub fn rpc_url(&self) -> Option<&str> {
        self.rpc_url.as_deref()
    }

    pub fn policies_context(&self) -> Option<&PolicyEvaluationContext> {
        self.policies_context.as_ref()
    }

    /// True when a policy evaluation has been recorded and it denied.
    pub fn policies_denied(&self) -> bool {
        self.policies_context
            .as_ref()
            .is_some_and(|policies| !policies.is_allowed())
    }
}

/// The single response shape returned by `precheck` and `execute`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    runtime_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    schema_validation_error: Option<SchemaValidationError>,
    context: InvocationContext,
}

impl ToolResponse {
    /// Build a successful response.
    ///
    /// A context whose policy evaluation denied can never yield success; such a
    /// response is downgraded to a failure carrying a runtime error.
    pub fn succeeded(result: Option<serde_json::Value>, context: InvocationContext) -> Self {
        if context.policies_denied() {
            tracing::warn!(
                "Refusing success response for {}: policy evaluation denied",
                context.tool_code_ref()
            );
            return Self::failed(context)
                .with_runtime_error("policy evaluation denied the invocation");
        }

        Self {
            success: true,
            result,
            runtime_error: None,
            schema_validation_error: None,
            context,
        }
    }

    pub fn failed(context: InvocationContext) -> Self {
        Self {
            success: false,
            result: None,
            runtime_error: None,
            schema_validation_error: None,
            context,
        }
    }

    pub fn with_result(mut self, result: Option<serde_json::Value>) -> Self {
        self.result = result;
        self
    }

    pub fn with_runtime_error(mut self, error: impl Into<String>) -> Self {
        self.runtime_error = Some(error.into());
        self
    }

    pub fn with_schema_error(mut self, error: SchemaValidationError) -> Self {
        self.schema_validation_error = Some(error);
        self
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn result(&self) -> Option<&serde_json::Value> {
        self.result.as_ref()
    }

    pub fn runtime_error(&self) -> Option<&str> {
        self.runtime_error.as_deref()
    }

    pub fn schema_validation_error(&self) -> Option<&SchemaValidationError> {
        self.schema_validation_error.as_ref()
    }

    pub fn context(&self) -> &InvocationContext {
        &self.context
    }

    pub fn into_context(self) -> InvocationContext {
        self.context
    }
}
