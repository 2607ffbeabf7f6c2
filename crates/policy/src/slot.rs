use async_trait::async_trait;
use serde_json::{Map, Value};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use toolgate_core::{BodyError, InvocationContext, Phase, ResultContracts, SchemaContract};

/// Arguments handed to a policy function.
#[derive(Debug, Clone)]
pub struct PolicyArgs {
    /// The tool params projected through the slot's parameter mapping.
    pub tool_params: Value,
    /// The delegator's decoded configuration for this policy.
    pub user_params: Value,
    pub context: InvocationContext,
}

/// One policy function: precheck, evaluate or commit.
///
/// Implementations return the raw `{"allow": bool, "result"?: ..}` wrapper;
/// see [`allow`] and [`deny`].
#[async_trait]
pub trait PolicyFn: Send + Sync {
    async fn call(&self, args: PolicyArgs) -> Result<Value, BodyError>;
}

/// Adapts an async closure into a [`PolicyFn`]; see [`policy_fn`].
pub struct FnPolicy<F>(F);

/// Wrap an async closure or `async fn` as a policy function.
pub fn policy_fn<F, Fut>(f: F) -> FnPolicy<F>
where
    F: Fn(PolicyArgs) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, BodyError>> + Send,
{
    FnPolicy(f)
}

#[async_trait]
impl<F, Fut> PolicyFn for FnPolicy<F>
where
    F: Fn(PolicyArgs) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, BodyError>> + Send,
{
    async fn call(&self, args: PolicyArgs) -> Result<Value, BodyError> {
        (self.0)(args).await
    }
}

/// Build an allow wrapper.
pub fn allow(result: Option<Value>) -> Value {
    wrap("allow", true, result)
}

/// Build a deny wrapper.
pub fn deny(result: Option<Value>) -> Value {
    wrap("allow", false, result)
}

fn wrap(flag: &str, value: bool, result: Option<Value>) -> Value {
    let mut wrapper = Map::new();
    wrapper.insert(flag.to_string(), Value::Bool(value));
    if let Some(result) = result {
        wrapper.insert("result".to_string(), result);
    }
    Value::Object(wrapper)
}

/// A policy as attached to one tool.
#[derive(Clone)]
pub struct PolicySlot {
    package_name: String,
    param_mapping: Vec<(String, String)>,
    tool_params: Option<SchemaContract>,
    user_params: Option<SchemaContract>,
    precheck: Option<Arc<dyn PolicyFn>>,
    evaluate: Arc<dyn PolicyFn>,
    commit: Option<Arc<dyn PolicyFn>>,
    precheck_contracts: ResultContracts,
    evaluate_contracts: ResultContracts,
    commit_params: Option<SchemaContract>,
    commit_contracts: ResultContracts,
}

impl PolicySlot {
    pub fn new(package_name: impl Into<String>, evaluate: impl PolicyFn + 'static) -> Self {
        Self {
            package_name: package_name.into(),
            param_mapping: Vec::new(),
            tool_params: None,
            user_params: None,
            precheck: None,
            evaluate: Arc::new(evaluate),
            commit: None,
            precheck_contracts: ResultContracts::default(),
            evaluate_contracts: ResultContracts::default(),
            commit_params: None,
            commit_contracts: ResultContracts::default(),
        }
    }

    /// Expose tool param `tool_key` to the policy as `policy_key`.
    pub fn map_param(mut self, tool_key: impl Into<String>, policy_key: impl Into<String>) -> Self {
        self.param_mapping.push((tool_key.into(), policy_key.into()));
        self
    }

    pub fn with_tool_params(mut self, contract: SchemaContract) -> Self {
        self.tool_params = Some(contract);
        self
    }

    pub fn with_user_params(mut self, contract: SchemaContract) -> Self {
        self.user_params = Some(contract);
        self
    }

    pub fn with_precheck(mut self, precheck: impl PolicyFn + 'static) -> Self {
        self.precheck = Some(Arc::new(precheck));
        self
    }

    pub fn with_commit(mut self, commit: impl PolicyFn + 'static) -> Self {
        self.commit = Some(Arc::new(commit));
        self
    }

    pub fn with_precheck_contracts(mut self, contracts: ResultContracts) -> Self {
        self.precheck_contracts = contracts;
        self
    }

    pub fn with_evaluate_contracts(mut self, contracts: ResultContracts) -> Self {
        self.evaluate_contracts = contracts;
        self
    }

    pub fn with_commit_params(mut self, contract: SchemaContract) -> Self {
        self.commit_params = Some(contract);
        self
    }

    pub fn with_commit_contracts(mut self, contracts: ResultContracts) -> Self {
        self.commit_contracts = contracts;
        self
    }

    pub fn package_name(&self) -> &str {
        &self.package_name
    }

    pub fn tool_params_contract(&self) -> Option<&SchemaContract> {
        self.tool_params.as_ref()
    }

    pub fn user_params_contract(&self) -> Option<&SchemaContract> {
        self.user_params.as_ref()
    }

    pub fn commit_params_contract(&self) -> Option<&SchemaContract> {
        self.commit_params.as_ref()
    }

    /// The function for `phase`. Only precheck can be absent.
    pub fn phase_fn(&self, phase: Phase) -> Option<Arc<dyn PolicyFn>> {
        match phase {
            Phase::Precheck => self.precheck.clone(),
            Phase::Execute => Some(self.evaluate.clone()),
        }
    }

    pub fn commit_fn(&self) -> Option<Arc<dyn PolicyFn>> {
        self.commit.clone()
    }

    pub fn contracts(&self, phase: Phase) -> &ResultContracts {
        match phase {
            Phase::Precheck => &self.precheck_contracts,
            Phase::Execute => &self.evaluate_contracts,
        }
    }

    pub fn commit_contracts(&self) -> &ResultContracts {
        &self.commit_contracts
    }

    /// Select and rename the tool params this policy cares about. Keys missing
    /// from `tool_params` are left out.
    pub fn project(&self, tool_params: &Value) -> Value {
        let mut projected = Map::new();
        for (tool_key, policy_key) in &self.param_mapping {
            if let Some(value) = tool_params.get(tool_key) {
                projected.insert(policy_key.clone(), value.clone());
            }
        }
        Value::Object(projected)
    }
}

impl fmt::Debug for PolicySlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicySlot")
            .field("package_name", &self.package_name)
            .field("param_mapping", &self.param_mapping)
            .field("has_precheck", &self.precheck.is_some())
            .field("has_commit", &self.commit.is_some())
            .finish()
    }
}

/// A policy that allows everything without a result.
pub struct AllowAll;

#[async_trait]
impl PolicyFn for AllowAll {
    async fn call(&self, _args: PolicyArgs) -> Result<Value, BodyError> {
        Ok(allow(None))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_projection_renames_and_filters() {
        let slot = PolicySlot::new("spend-limit", AllowAll)
            .map_param("amountIn", "amount")
            .map_param("tokenIn", "token")
            .map_param("missing", "ignored");

        let projected = slot.project(&json!({"amountIn": 10, "tokenIn": "USDC", "slippage": 1}));
        assert_eq!(projected, json!({"amount": 10, "token": "USDC"}));
    }

    #[test]
    fn test_projection_without_mapping_is_empty() {
        let slot = PolicySlot::new("noop", AllowAll);
        assert_eq!(slot.project(&json!({"a": 1})), json!({}));
    }

    #[test]
    fn test_precheck_is_optional_but_evaluate_is_not() {
        let slot = PolicySlot::new("noop", AllowAll);
        assert!(slot.phase_fn(Phase::Precheck).is_none());
        assert!(slot.phase_fn(Phase::Execute).is_some());

        let slot = slot.with_precheck(AllowAll);
        assert!(slot.phase_fn(Phase::Precheck).is_some());
    }

    #[test]
    fn test_wrappers() {
        assert_eq!(allow(None), json!({"allow": true}));
        assert_eq!(
            deny(Some(json!({"reason": "limit exceeded"}))),
            json!({"allow": false, "result": {"reason": "limit exceeded"}})
        );
    }
}
