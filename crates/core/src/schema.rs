//! Schema contracts and the validation routine shared by every data slot.

use crate::types::{Phase, SchemaValidationError, Stage};
use jsonschema::{Draft, Validator};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ContractError {
    #[error("Invalid schema: {0}")]
    InvalidSchema(String),
}

/// A compiled JSON Schema guarding one data slot.
#[derive(Clone)]
pub struct SchemaContract {
    schema: Value,
    validator: Arc<Validator>,
}

impl SchemaContract {
    pub fn new(schema: Value) -> Result<Self, ContractError> {
        let validator = jsonschema::options()
            .with_draft(Draft::Draft202012)
            .build(&schema)
            .map_err(|err| ContractError::InvalidSchema(err.to_string()))?;

        Ok(Self {
            schema,
            validator: Arc::new(validator),
        })
    }

    pub fn schema(&self) -> &Value {
        &self.schema
    }

    /// Check a value, returning every violation message on failure.
    pub fn check(&self, value: &Value) -> Result<(), Vec<String>> {
        let details: Vec<String> = self
            .validator
            .iter_errors(value)
            .map(|err| err.to_string())
            .collect();

        if details.is_empty() {
            Ok(())
        } else {
            Err(details)
        }
    }
}

impl fmt::Debug for SchemaContract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaContract")
            .field("schema", &self.schema)
            .finish()
    }
}

/// A value that went through [`validate`].
///
/// `Typed` means a contract existed and accepted the value. `Untyped` means no
/// contract was declared, so nothing is guaranteed about its shape.
#[derive(Debug, Clone, PartialEq)]
pub enum Validated {
    Typed(Value),
    Untyped(Value),
}

impl Validated {
    pub fn is_typed(&self) -> bool {
        matches!(self, Validated::Typed(_))
    }

    /// The value, only if a contract vouched for it.
    pub fn into_typed(self) -> Option<Value> {
        match self {
            Validated::Typed(value) => Some(value),
            Validated::Untyped(_) => None,
        }
    }

    pub fn into_inner(self) -> Value {
        match self {
            Validated::Typed(value) | Validated::Untyped(value) => value,
        }
    }
}

/// Validate `raw` against an optional contract, tagging failures with `phase` and `stage`.
pub fn validate(
    raw: Value,
    contract: Option<&SchemaContract>,
    phase: Phase,
    stage: Stage,
) -> Result<Validated, SchemaValidationError> {
    let Some(contract) = contract else {
        return Ok(Validated::Untyped(raw));
    };

    match contract.check(&raw) {
        Ok(()) => Ok(Validated::Typed(raw)),
        Err(details) => Err(SchemaValidationError::new(phase, stage, details)),
    }
}

/// The success/failure (or allow/deny) contracts for one result slot.
#[derive(Debug, Clone, Default)]
pub struct ResultContracts {
    pub success: Option<SchemaContract>,
    pub failure: Option<SchemaContract>,
}

impl ResultContracts {
    pub fn new(success: Option<SchemaContract>, failure: Option<SchemaContract>) -> Self {
        Self { success, failure }
    }
}
