use crate::traits::ToolFn;
use std::fmt;
use std::sync::Arc;
use toolgate_core::{ResultContracts, SchemaContract};
use toolgate_policy::{PolicyChain, PolicySlot};

/// A named, versioned tool: its contracts, its policy chain and its bodies.
#[derive(Clone)]
pub struct ToolSpec {
    name: String,
    code_ref: String,
    description: String,
    params: Option<SchemaContract>,
    policies: Arc<PolicyChain>,
    precheck: Option<Arc<dyn ToolFn>>,
    execute: Arc<dyn ToolFn>,
    precheck_contracts: ResultContracts,
    execute_contracts: ResultContracts,
}

impl ToolSpec {
    /// `code_ref` is the content-addressed reference of the code the remote
    /// environment runs for this tool.
    pub fn new(
        name: impl Into<String>,
        code_ref: impl Into<String>,
        execute: impl ToolFn + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            code_ref: code_ref.into(),
            description: String::new(),
            params: None,
            policies: Arc::new(PolicyChain::default()),
            precheck: None,
            execute: Arc::new(execute),
            precheck_contracts: ResultContracts::default(),
            execute_contracts: ResultContracts::default(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_params(mut self, contract: SchemaContract) -> Self {
        self.params = Some(contract);
        self
    }

    pub fn with_policies(mut self, slots: Vec<PolicySlot>) -> Self {
        self.policies = Arc::new(PolicyChain::new(slots));
        self
    }

    pub fn with_precheck(mut self, precheck: impl ToolFn + 'static) -> Self {
        self.precheck = Some(Arc::new(precheck));
        self
    }

    pub fn with_precheck_contracts(mut self, contracts: ResultContracts) -> Self {
        self.precheck_contracts = contracts;
        self
    }

    pub fn with_execute_contracts(mut self, contracts: ResultContracts) -> Self {
        self.execute_contracts = contracts;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn code_ref(&self) -> &str {
        &self.code_ref
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn params_contract(&self) -> Option<&SchemaContract> {
        self.params.as_ref()
    }

    pub fn policies(&self) -> &Arc<PolicyChain> {
        &self.policies
    }

    pub fn precheck_fn(&self) -> Option<Arc<dyn ToolFn>> {
        self.precheck.clone()
    }

    pub fn execute_fn(&self) -> Arc<dyn ToolFn> {
        self.execute.clone()
    }

    pub fn precheck_contracts(&self) -> &ResultContracts {
        &self.precheck_contracts
    }

    pub fn execute_contracts(&self) -> &ResultContracts {
        &self.execute_contracts
    }
}

impl fmt::Debug for ToolSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolSpec")
            .field("name", &self.name)
            .field("code_ref", &self.code_ref)
            .field("policies", &self.policies)
            .field("has_precheck", &self.precheck.is_some())
            .finish()
    }
}
