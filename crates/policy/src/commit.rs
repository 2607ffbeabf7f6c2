//! Post-execution side effects for policies that allowed.

use crate::chain::PolicyChain;
use crate::slot::PolicyArgs;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use toolgate_core::{
    classify_and_validate, run_isolated, validate, Discriminant, InvocationContext, Outcome,
    Phase, SchemaValidationError, Stage,
};
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum CommitError {
    #[error("Policy {0} did not allow this invocation")]
    NotAllowed(String),

    #[error("Policy {0} does not support commit")]
    Unsupported(String),

    #[error(transparent)]
    Schema(#[from] SchemaValidationError),

    #[error("Commit failed for policy {policy}: {message}")]
    Failed { policy: String, message: String },
}

/// Lets an execute body record policy side effects once it knows it will succeed.
#[derive(Clone)]
pub struct CommitHandle {
    chain: Arc<PolicyChain>,
    configurations: BTreeMap<String, Value>,
    context: InvocationContext,
}

impl CommitHandle {
    /// `context` must already carry the policy evaluation outcome; without one
    /// no policy counts as allowed.
    pub fn new(
        chain: Arc<PolicyChain>,
        configurations: BTreeMap<String, Value>,
        context: InvocationContext,
    ) -> Self {
        Self {
            chain,
            configurations,
            context,
        }
    }

    pub async fn commit(&self, package_name: &str, params: Value) -> Result<Outcome, CommitError> {
        let allowed = self
            .context
            .policies_context()
            .is_some_and(|policies| {
                policies.is_allowed() && policies.allowed_policies().contains_key(package_name)
            });
        if !allowed {
            return Err(CommitError::NotAllowed(package_name.to_string()));
        }

        let slot = self
            .chain
            .get(package_name)
            .ok_or_else(|| CommitError::NotAllowed(package_name.to_string()))?;
        let commit_fn = slot
            .commit_fn()
            .ok_or_else(|| CommitError::Unsupported(package_name.to_string()))?;

        let params = validate(
            params,
            slot.commit_params_contract(),
            Phase::Execute,
            Stage::Input,
        )?
        .into_inner();

        let args = PolicyArgs {
            tool_params: params,
            user_params: self
                .configurations
                .get(package_name)
                .cloned()
                .unwrap_or(Value::Null),
            context: self.context.clone(),
        };

        debug!("Committing policy {}", package_name);
        let label = format!("policy {package_name} commit");
        let raw = run_isolated(&label, async move { commit_fn.call(args).await })
            .await
            .map_err(|message| {
                warn!("Commit for policy {} failed: {}", package_name, message);
                CommitError::Failed {
                    policy: package_name.to_string(),
                    message,
                }
            })?;

        Ok(classify_and_validate(
            &raw,
            Discriminant::Allow,
            slot.commit_contracts(),
            Phase::Execute,
            Stage::Output,
        )?)
    }
}
