//! Gated tool invocation for callers: validate params, resolve permissions,
//! run the policy chain, then run the tool locally (precheck) or remotely
//! (execute) and reconcile whatever comes back.

pub mod client;
pub mod config;
pub mod registry;
pub mod telemetry;

pub use client::ToolClient;
pub use config::{load_client_config, ClientConfig, ConfigError, ExecutionConfig};
pub use registry::{decode_rpc_response, InMemoryPermissionRegistry, RpcPermissionRegistry};
pub use telemetry::init_tracing;
