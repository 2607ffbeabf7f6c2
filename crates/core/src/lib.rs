//! Shared types for gated tool invocation: schema contracts, result
//! classification, policy evaluation context and the response shape.

pub mod classify;
pub mod envelope;
pub mod error;
pub mod interfaces;
pub mod isolate;
pub mod metrics;
pub mod policy_context;
pub mod schema;
pub mod types;

pub use classify::{classify, classify_and_validate, Discriminant, Matched, Outcome};
pub use envelope::{RemoteEnvelope, ToolExecutionResult};
pub use error::InvocationError;
pub use interfaces::{
    Credentials, PermissionRegistry, PermissionResolution, RemoteExecutionService, RemoteReply,
    SessionProvider,
};
pub use isolate::run_isolated;
pub use metrics::{Metrics, MetricsSnapshot};
pub use policy_context::{AllowedPolicy, DeniedPolicy, PolicyEvaluationContext, PolicyVerdict};
pub use schema::{validate, ContractError, ResultContracts, SchemaContract, Validated};
pub use types::*;
