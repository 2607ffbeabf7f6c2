//! Ordered policy evaluation with short-circuit deny.

use crate::slot::{PolicyArgs, PolicySlot};
use serde_json::Value;
use std::collections::BTreeMap;
use toolgate_core::{
    classify_and_validate, run_isolated, validate, AllowedPolicy, DeniedPolicy, Discriminant,
    InvocationContext, InvocationError, Outcome, Phase, PolicyEvaluationContext, Stage,
};
use tracing::{debug, info, warn};

/// What happened to one slot.
enum SlotOutcome {
    Skipped,
    Allowed(Option<Value>),
    Denied(DeniedPolicy),
}

/// The policies a tool supports, in evaluation order.
#[derive(Debug, Clone, Default)]
pub struct PolicyChain {
    slots: Vec<PolicySlot>,
}

impl PolicyChain {
    pub fn new(slots: Vec<PolicySlot>) -> Self {
        Self { slots }
    }

    pub fn slots(&self) -> &[PolicySlot] {
        &self.slots
    }

    pub fn get(&self, package_name: &str) -> Option<&PolicySlot> {
        self.slots
            .iter()
            .find(|slot| slot.package_name() == package_name)
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Every configured policy must be one this chain knows about.
    pub fn ensure_supported(
        &self,
        tool: &str,
        configurations: &BTreeMap<String, Value>,
    ) -> Result<(), InvocationError> {
        match configurations.keys().find(|name| self.get(name).is_none()) {
            Some(policy) => Err(InvocationError::UnsupportedPolicy {
                tool: tool.to_string(),
                policy: policy.clone(),
            }),
            None => Ok(()),
        }
    }

    /// Run the enabled slots for `phase` strictly in declaration order,
    /// stopping at the first deny.
    ///
    /// A slot is enabled when `configurations` carries an entry for it. Errors
    /// and panics raised by a policy function become a deny carrying the
    /// message; nothing raised here reaches the caller.
    pub async fn evaluate(
        &self,
        phase: Phase,
        tool_params: &Value,
        configurations: &BTreeMap<String, Value>,
        context: &InvocationContext,
    ) -> PolicyEvaluationContext {
        let mut evaluated = Vec::new();
        let mut allowed = BTreeMap::new();

        for slot in &self.slots {
            let Some(user_params) = configurations.get(slot.package_name()) else {
                continue;
            };

            let name = slot.package_name().to_string();
            evaluated.push(name.clone());
            debug!("Evaluating policy {} ({})", name, phase);

            match self
                .evaluate_slot(slot, phase, tool_params, user_params, context)
                .await
            {
                SlotOutcome::Skipped => {
                    debug!("Policy {} has no {} function, skipping", name, phase);
                }
                SlotOutcome::Allowed(result) => {
                    allowed.insert(name, AllowedPolicy { result });
                }
                SlotOutcome::Denied(denied) => {
                    info!("Policy {} denied during {}", name, phase);
                    return PolicyEvaluationContext::denied(evaluated, denied, allowed);
                }
            }
        }

        PolicyEvaluationContext::allowed(evaluated, allowed)
    }

    async fn evaluate_slot(
        &self,
        slot: &PolicySlot,
        phase: Phase,
        tool_params: &Value,
        user_params: &Value,
        context: &InvocationContext,
    ) -> SlotOutcome {
        let name = slot.package_name();
        let Some(policy_fn) = slot.phase_fn(phase) else {
            return SlotOutcome::Skipped;
        };

        let tool_params = match validate(
            slot.project(tool_params),
            slot.tool_params_contract(),
            phase,
            Stage::Input,
        ) {
            Ok(validated) => validated.into_inner(),
            Err(err) => {
                warn!("Policy {} rejected projected tool params: {}", name, err);
                return SlotOutcome::Denied(DeniedPolicy::new(name).with_schema_error(err));
            }
        };

        let user_params = match validate(
            user_params.clone(),
            slot.user_params_contract(),
            phase,
            Stage::Input,
        ) {
            Ok(validated) => validated.into_inner(),
            Err(err) => {
                warn!("Policy {} rejected its configuration: {}", name, err);
                return SlotOutcome::Denied(DeniedPolicy::new(name).with_schema_error(err));
            }
        };

        let args = PolicyArgs {
            tool_params,
            user_params,
            context: context.clone(),
        };
        let label = format!("policy {name} {phase}");
        let raw = match run_isolated(&label, async move { policy_fn.call(args).await }).await {
            Ok(raw) => raw,
            Err(message) => {
                warn!("Policy {} raised during {}: {}", name, phase, message);
                return SlotOutcome::Denied(DeniedPolicy::new(name).with_runtime_error(message));
            }
        };

        match classify_and_validate(
            &raw,
            Discriminant::Allow,
            slot.contracts(phase),
            phase,
            Stage::Output,
        ) {
            Ok(Outcome::Success(result)) => SlotOutcome::Allowed(result.into_typed()),
            Ok(Outcome::Failure { payload, error }) => {
                let mut denied = DeniedPolicy::new(name).with_result(payload.into_typed());
                if let Some(error) = error {
                    denied = denied.with_runtime_error(error);
                }
                SlotOutcome::Denied(denied)
            }
            Err(err) => {
                warn!("Policy {} returned a malformed result: {}", name, err);
                SlotOutcome::Denied(DeniedPolicy::new(name).with_schema_error(err))
            }
        }
    }
}
