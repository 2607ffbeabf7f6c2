//! Outcome of running a policy chain.

use crate::types::SchemaValidationError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Result recorded for a policy that allowed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllowedPolicy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

/// The policy that stopped the chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeniedPolicy {
    pub package_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_validation_error: Option<SchemaValidationError>,
}

impl DeniedPolicy {
    pub fn new(package_name: impl Into<String>) -> Self {
        Self {
            package_name: package_name.into(),
            result: None,
            runtime_error: None,
            schema_validation_error: None,
        }
    }

    pub fn with_result(mut self, result: Option<Value>) -> Self {
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
}

#[derive(Debug, Clone, PartialEq)]
pub enum PolicyVerdict {
    Allow,
    Deny(DeniedPolicy),
}

/// Which policies ran, which allowed, and which (if any) denied.
///
/// Exactly one of allow/deny holds, and a denied policy is always the last
/// entry of `evaluated_policies`. Deserialization rejects payloads that break
/// either rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WirePolicyContext", into = "WirePolicyContext")]
pub struct PolicyEvaluationContext {
    evaluated_policies: Vec<String>,
    allowed_policies: BTreeMap<String, AllowedPolicy>,
    verdict: PolicyVerdict,
}

impl PolicyEvaluationContext {
    pub fn allowed(
        evaluated_policies: Vec<String>,
        allowed_policies: BTreeMap<String, AllowedPolicy>,
    ) -> Self {
        Self {
            evaluated_policies,
            allowed_policies,
            verdict: PolicyVerdict::Allow,
        }
    }

    pub fn denied(
        mut evaluated_policies: Vec<String>,
        denied: DeniedPolicy,
        mut allowed_policies: BTreeMap<String, AllowedPolicy>,
    ) -> Self {
        if evaluated_policies.last() != Some(&denied.package_name) {
            evaluated_policies.push(denied.package_name.clone());
        }
        allowed_policies.remove(&denied.package_name);

        Self {
            evaluated_policies,
            allowed_policies,
            verdict: PolicyVerdict::Deny(denied),
        }
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self.verdict, PolicyVerdict::Allow)
    }

    pub fn verdict(&self) -> &PolicyVerdict {
        &self.verdict
    }

    pub fn evaluated_policies(&self) -> &[String] {
        &self.evaluated_policies
    }

    pub fn allowed_policies(&self) -> &BTreeMap<String, AllowedPolicy> {
        &self.allowed_policies
    }

    pub fn denied_policy(&self) -> Option<&DeniedPolicy> {
        match &self.verdict {
            PolicyVerdict::Allow => None,
            PolicyVerdict::Deny(denied) => Some(denied),
        }
    }
}

impl Default for PolicyEvaluationContext {
    fn default() -> Self {
        Self::allowed(Vec::new(), BTreeMap::new())
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WirePolicyContext {
    allow: bool,
    #[serde(default)]
    evaluated_policies: Vec<String>,
    #[serde(default)]
    allowed_policies: BTreeMap<String, AllowedPolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    denied_policy: Option<DeniedPolicy>,
}

impl TryFrom<WirePolicyContext> for PolicyEvaluationContext {
    type Error = String;

    fn try_from(wire: WirePolicyContext) -> Result<Self, Self::Error> {
        match (wire.allow, wire.denied_policy) {
            (true, None) => Ok(Self::allowed(wire.evaluated_policies, wire.allowed_policies)),
            (true, Some(denied)) => Err(format!(
                "policy context allows but names denied policy {}",
                denied.package_name
            )),
            (false, None) => Err("policy context denies without a denied policy".to_string()),
            (false, Some(denied)) => {
                if wire.evaluated_policies.last() != Some(&denied.package_name) {
                    return Err(format!(
                        "denied policy {} is not the last evaluated policy",
                        denied.package_name
                    ));
                }
                if wire.allowed_policies.contains_key(&denied.package_name) {
                    return Err(format!(
                        "policy {} is both allowed and denied",
                        denied.package_name
                    ));
                }
                Ok(Self::denied(
                    wire.evaluated_policies,
                    denied,
                    wire.allowed_policies,
                ))
            }
        }
    }
}

impl From<PolicyEvaluationContext> for WirePolicyContext {
    fn from(context: PolicyEvaluationContext) -> Self {
        let (allow, denied_policy) = match context.verdict {
            PolicyVerdict::Allow => (true, None),
            PolicyVerdict::Deny(denied) => (false, Some(denied)),
        };
        Self {
            allow,
            evaluated_policies: context.evaluated_policies,
            allowed_policies: context.allowed_policies,
            denied_policy,
        }
    }
}
