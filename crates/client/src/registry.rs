//! Permission registry clients.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use toolgate_core::{InvocationError, PermissionRegistry, PermissionResolution};
use tracing::{debug, warn};

pub const RESOLVE_METHOD: &str = "toolgate_resolvePermissions";

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'static str,
    params: ResolveParams<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ResolveParams<'a> {
    delegatee: &'a str,
    delegator: &'a str,
    code_ref: &'a str,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<PermissionResolution>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

/// JSON-RPC 2.0 client for the permission registry.
pub struct RpcPermissionRegistry {
    rpc_url: String,
    client: reqwest::Client,
    next_id: AtomicU64,
}

impl RpcPermissionRegistry {
    pub fn new(rpc_url: impl Into<String>, timeout: Duration) -> Result<Self, InvocationError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| InvocationError::Registry(format!("Failed to build client: {}", e)))?;
        Ok(Self {
            rpc_url: rpc_url.into(),
            client,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }
}

/// Decode a JSON-RPC response body into a resolution.
pub fn decode_rpc_response(body: &str) -> Result<PermissionResolution, InvocationError> {
    let response: RpcResponse = serde_json::from_str(body)
        .map_err(|e| InvocationError::Registry(format!("Invalid registry response: {}", e)))?;

    match (response.result, response.error) {
        (_, Some(error)) => Err(InvocationError::Registry(format!(
            "registry error {}: {}",
            error.code, error.message
        ))),
        (Some(resolution), None) => Ok(resolution),
        (None, None) => Err(InvocationError::Registry(
            "registry response carries neither result nor error".to_string(),
        )),
    }
}

#[async_trait]
impl PermissionRegistry for RpcPermissionRegistry {
    async fn resolve(
        &self,
        delegatee: &str,
        delegator: &str,
        code_ref: &str,
    ) -> Result<PermissionResolution, InvocationError> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method: RESOLVE_METHOD,
            params: ResolveParams {
                delegatee,
                delegator,
                code_ref,
            },
        };
        debug!("Resolving permissions of {} for {}", delegatee, code_ref);

        let response = self
            .client
            .post(&self.rpc_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                warn!("Permission registry unreachable: {}", e);
                InvocationError::Registry(format!("Request failed: {}", e))
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| InvocationError::Registry(format!("Failed to read body: {}", e)))?;
        if !status.is_success() {
            return Err(InvocationError::Registry(format!(
                "Registry returned {}: {}",
                status, body
            )));
        }

        decode_rpc_response(&body)
    }
}

type PermissionKey = (String, String, String);

/// Registry backed by a map; unknown delegations are refused.
#[derive(Default)]
pub struct InMemoryPermissionRegistry {
    entries: RwLock<HashMap<PermissionKey, PermissionResolution>>,
}

impl InMemoryPermissionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant(
        &self,
        delegatee: impl Into<String>,
        delegator: impl Into<String>,
        code_ref: impl Into<String>,
        resolution: PermissionResolution,
    ) {
        self.entries
            .write()
            .insert((delegatee.into(), delegator.into(), code_ref.into()), resolution);
    }

    pub fn revoke(&self, delegatee: &str, delegator: &str, code_ref: &str) -> bool {
        self.entries
            .write()
            .remove(&(
                delegatee.to_string(),
                delegator.to_string(),
                code_ref.to_string(),
            ))
            .is_some()
    }
}

#[async_trait]
impl PermissionRegistry for InMemoryPermissionRegistry {
    async fn resolve(
        &self,
        delegatee: &str,
        delegator: &str,
        code_ref: &str,
    ) -> Result<PermissionResolution, InvocationError> {
        let key = (
            delegatee.to_string(),
            delegator.to_string(),
            code_ref.to_string(),
        );
        self.entries.read().get(&key).cloned().ok_or_else(|| {
            InvocationError::Registry(format!(
                "no permission for {} on behalf of {} to run {}",
                delegatee, delegator, code_ref
            ))
        })
    }
}
