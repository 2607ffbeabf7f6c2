//! Abstract interfaces for the collaborators an invocation depends on.

use crate::error::InvocationError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// What the permission registry knows about one delegation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionResolution {
    pub app_id: u64,
    pub app_version: u64,
    /// Decoded user configuration, keyed by policy package name.
    #[serde(default)]
    pub policy_configurations: BTreeMap<String, Value>,
}

/// Permission lookup interface.
#[async_trait]
pub trait PermissionRegistry: Send + Sync {
    /// Resolve the app binding and policy configuration for a delegation.
    /// Any failure is fatal to the invocation.
    async fn resolve(
        &self,
        delegatee: &str,
        delegator: &str,
        code_ref: &str,
    ) -> Result<PermissionResolution, InvocationError>;
}

/// Short-lived credentials authorising one call to the execution service.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    pub signer: String,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl Credentials {
    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("signer", &self.signer)
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Credential issuing interface.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    async fn issue(&self, signer: &str) -> Result<Credentials, InvocationError>;
}

/// Raw reply from the execution service, before any reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteReply {
    pub success: bool,
    /// Either a JSON string that still needs parsing, or structured data.
    #[serde(default)]
    pub response: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Remote execution interface.
#[async_trait]
pub trait RemoteExecutionService: Send + Sync {
    /// Run the code named by `code_ref` with the given parameters.
    async fn invoke(
        &self,
        code_ref: &str,
        credentials: &Credentials,
        params: Value,
    ) -> Result<RemoteReply, InvocationError>;

    /// Release any shared connection state. In-flight calls are unaffected.
    async fn shutdown(&self) {}
}
