//! Payload shape produced inside the remote execution environment.

use crate::types::{InvocationContext, SchemaValidationError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolExecutionResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_validation_error: Option<SchemaValidationError>,
}

impl ToolExecutionResult {
    pub fn success(result: Option<Value>) -> Self {
        Self {
            success: true,
            result,
            runtime_error: None,
            schema_validation_error: None,
        }
    }

    pub fn failure(result: Option<Value>) -> Self {
        Self {
            success: false,
            result,
            runtime_error: None,
            schema_validation_error: None,
        }
    }

    pub fn with_runtime_error(mut self, error: Option<String>) -> Self {
        self.runtime_error = error;
        self
    }

    pub fn with_schema_error(mut self, error: SchemaValidationError) -> Self {
        self.schema_validation_error = Some(error);
        self
    }

    /// Rebuild the `{"success", "result", "error"}` wrapper used for classification.
    pub fn to_wrapper(&self) -> Value {
        let mut wrapper = serde_json::Map::new();
        wrapper.insert("success".to_string(), Value::Bool(self.success));
        if let Some(result) = &self.result {
            wrapper.insert("result".to_string(), result.clone());
        }
        if let Some(error) = &self.runtime_error {
            wrapper.insert("error".to_string(), Value::String(error.clone()));
        }
        Value::Object(wrapper)
    }
}

/// `{toolExecutionResult, toolContext}`: the only shape a remote run may return.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteEnvelope {
    pub tool_execution_result: ToolExecutionResult,
    pub tool_context: InvocationContext,
}
