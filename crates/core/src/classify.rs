//! Picks the success or failure contract for a raw result, then validates it.
//!
//! Tool bodies return `{"success": bool, "result"?: .., "error"?: ..}` and
//! policy functions return `{"allow": bool, "result"?: ..}`. Only the wrapper
//! is inspected for the flag, never the payload inside `result`, and only a
//! literal JSON `true` selects the success side.

use crate::schema::{validate, ResultContracts, Validated};
use crate::types::{Phase, SchemaValidationError, Stage};
use serde_json::Value;

/// Name of the boolean flag a wrapper carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Discriminant {
    Allow,
    Success,
}

impl Discriminant {
    pub fn field(self) -> &'static str {
        match self {
            Discriminant::Allow => "allow",
            Discriminant::Success => "success",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Matched {
    Success,
    Failure,
}

/// Decide which side of the contract pair applies. Anything other than a
/// literal `true` flag is a failure.
pub fn classify(value: &Value, discriminant: Discriminant) -> Matched {
    match value.get(discriminant.field()) {
        Some(Value::Bool(true)) => Matched::Success,
        _ => Matched::Failure,
    }
}

/// A classified and validated result.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Success(Validated),
    Failure {
        payload: Validated,
        error: Option<String>,
    },
}

impl Outcome {
    pub fn matched(&self) -> Matched {
        match self {
            Outcome::Success(_) => Matched::Success,
            Outcome::Failure { .. } => Matched::Failure,
        }
    }
}

/// Classify `raw`, then validate its `result` against the matching contract.
///
/// A missing `result` is validated as `null`.
pub fn classify_and_validate(
    raw: &Value,
    discriminant: Discriminant,
    contracts: &ResultContracts,
    phase: Phase,
    stage: Stage,
) -> Result<Outcome, SchemaValidationError> {
    let matched = classify(raw, discriminant);
    let payload = raw.get("result").cloned().unwrap_or(Value::Null);

    match matched {
        Matched::Success => {
            let payload = validate(payload, contracts.success.as_ref(), phase, stage)?;
            Ok(Outcome::Success(payload))
        }
        Matched::Failure => {
            let payload = validate(payload, contracts.failure.as_ref(), phase, stage)?;
            let error = raw
                .get("error")
                .and_then(Value::as_str)
                .map(str::to_string);
            Ok(Outcome::Failure { payload, error })
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::schema::SchemaContract;
    use proptest::prelude::*;
    use serde_json::json;

    fn reason_contracts() -> ResultContracts {
        ResultContracts::new(
            Some(SchemaContract::new(json!({"type": "object", "required": ["ok"]})).unwrap()),
            Some(
                SchemaContract::new(json!({
                    "type": "object",
                    "properties": {"reason": {"type": "string"}},
                    "required": ["reason"]
                }))
                .unwrap(),
            ),
        )
    }

    #[test]
    fn test_true_flag_is_success() {
        assert_eq!(classify(&json!({"allow": true}), Discriminant::Allow), Matched::Success);
        assert_eq!(classify(&json!({"success": true}), Discriminant::Success), Matched::Success);
    }

    #[test]
    fn test_missing_flag_fails_closed() {
        assert_eq!(classify(&json!({"result": 1}), Discriminant::Allow), Matched::Failure);
        assert_eq!(classify(&json!(null), Discriminant::Allow), Matched::Failure);
    }

    #[test]
    fn test_truthy_non_bool_flag_is_failure() {
        assert_eq!(classify(&json!({"allow": "true"}), Discriminant::Allow), Matched::Failure);
        assert_eq!(classify(&json!({"allow": 1}), Discriminant::Allow), Matched::Failure);
    }

    #[test]
    fn test_flag_inside_payload_is_ignored() {
        let raw = json!({"result": {"allow": true}});
        assert_eq!(classify(&raw, Discriminant::Allow), Matched::Failure);
    }

    #[test]
    fn test_deny_validates_against_deny_contract() {
        let raw = json!({"allow": false, "result": {"reason": "limit exceeded"}});
        let outcome = classify_and_validate(
            &raw,
            Discriminant::Allow,
            &reason_contracts(),
            Phase::Execute,
            Stage::Output,
        )
        .unwrap();

        match outcome {
            Outcome::Failure { payload, error } => {
                assert_eq!(payload.into_typed(), Some(json!({"reason": "limit exceeded"})));
                assert!(error.is_none());
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn test_wrong_shape_reports_provenance() {
        let raw = json!({"success": true, "result": {"unexpected": 1}});
        let err = classify_and_validate(
            &raw,
            Discriminant::Success,
            &reason_contracts(),
            Phase::Precheck,
            Stage::Output,
        )
        .unwrap_err();

        assert_eq!(err.phase, Phase::Precheck);
        assert_eq!(err.stage, Stage::Output);
    }

    #[test]
    fn test_failure_error_message_is_extracted() {
        let raw = json!({"success": false, "error": "insufficient balance"});
        let outcome = classify_and_validate(
            &raw,
            Discriminant::Success,
            &ResultContracts::default(),
            Phase::Execute,
            Stage::Output,
        )
        .unwrap();

        assert_eq!(
            outcome,
            Outcome::Failure {
                payload: Validated::Untyped(Value::Null),
                error: Some("insufficient balance".to_string()),
            }
        );
    }

    fn arb_json() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(|n| json!(n)),
            "[a-z]{0,8}".prop_map(Value::String),
        ];
        leaf.prop_recursive(3, 24, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                prop::collection::hash_map(
                    prop_oneof![Just("allow".to_string()), "[a-z]{1,6}"],
                    inner,
                    0..4
                )
                .prop_map(|map| Value::Object(map.into_iter().collect())),
            ]
        })
    }

    proptest! {
        #[test]
        fn classification_is_exhaustive(value in arb_json()) {
            let matched = classify(&value, Discriminant::Allow);
            let expected = if value.get("allow") == Some(&Value::Bool(true)) {
                Matched::Success
            } else {
                Matched::Failure
            };
            prop_assert_eq!(matched, expected);

            let outcome = classify_and_validate(
                &value,
                Discriminant::Allow,
                &ResultContracts::default(),
                Phase::Precheck,
                Stage::Output,
            );
            prop_assert!(outcome.is_ok());
            prop_assert_eq!(outcome.unwrap().matched(), matched);
        }
    }
}
