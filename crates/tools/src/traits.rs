use async_trait::async_trait;
use serde_json::{Map, Value};
use std::future::Future;
use toolgate_core::{BodyError, InvocationContext, PolicyEvaluationContext};
use toolgate_policy::CommitHandle;

/// What a tool body sees besides its params.
#[derive(Clone)]
pub struct ToolBodyContext {
    pub invocation: InvocationContext,
    commits: Option<CommitHandle>,
}

impl ToolBodyContext {
    /// Context for the local precheck body. Commits are not available.
    pub fn precheck(invocation: InvocationContext) -> Self {
        Self {
            invocation,
            commits: None,
        }
    }

    pub fn execute(invocation: InvocationContext, commits: CommitHandle) -> Self {
        Self {
            invocation,
            commits: Some(commits),
        }
    }

    pub fn policies(&self) -> Option<&PolicyEvaluationContext> {
        self.invocation.policies_context()
    }

    pub fn commits(&self) -> Option<&CommitHandle> {
        self.commits.as_ref()
    }
}

/// A tool body: precheck or execute.
///
/// Implementations return the raw `{"success": bool, "result"?: .., "error"?: ..}`
/// wrapper; see [`succeed`] and [`fail`].
#[async_trait]
pub trait ToolFn: Send + Sync {
    async fn call(&self, params: Value, ctx: ToolBodyContext) -> Result<Value, BodyError>;
}

/// Adapts an async closure into a [`ToolFn`]; see [`tool_fn`].
pub struct FnTool<F>(F);

pub fn tool_fn<F, Fut>(f: F) -> FnTool<F>
where
    F: Fn(Value, ToolBodyContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, BodyError>> + Send,
{
    FnTool(f)
}

#[async_trait]
impl<F, Fut> ToolFn for FnTool<F>
where
    F: Fn(Value, ToolBodyContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, BodyError>> + Send,
{
    async fn call(&self, params: Value, ctx: ToolBodyContext) -> Result<Value, BodyError> {
        (self.0)(params, ctx).await
    }
}

pub fn succeed(result: Option<Value>) -> Value {
    let mut wrapper = Map::new();
    wrapper.insert("success".to_string(), Value::Bool(true));
    if let Some(result) = result {
        wrapper.insert("result".to_string(), result);
    }
    Value::Object(wrapper)
}

pub fn fail(result: Option<Value>, error: Option<&str>) -> Value {
    let mut wrapper = Map::new();
    wrapper.insert("success".to_string(), Value::Bool(false));
    if let Some(result) = result {
        wrapper.insert("result".to_string(), result);
    }
    if let Some(error) = error {
        wrapper.insert("error".to_string(), Value::String(error.to_string()));
    }
    Value::Object(wrapper)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wrappers() {
        assert_eq!(succeed(None), json!({"success": true}));
        assert_eq!(
            succeed(Some(json!({"txHash": "0x1"}))),
            json!({"success": true, "result": {"txHash": "0x1"}})
        );
        assert_eq!(
            fail(None, Some("insufficient balance")),
            json!({"success": false, "error": "insufficient balance"})
        );
    }
}
