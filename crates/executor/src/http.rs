//! HTTP client for the remote execution environment.

use crate::connection::RemoteConnection;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use toolgate_core::{Credentials, InvocationError, RemoteExecutionService, RemoteReply};
use tracing::{debug, warn};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ExecuteRequest<'a> {
    code_ref: &'a str,
    credentials: RequestCredentials<'a>,
    js_params: Value,
}

/// The token travels in the `Authorization` header only.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RequestCredentials<'a> {
    signer: &'a str,
    expires_at: DateTime<Utc>,
}

/// Why one attempt failed. Only `Unreachable` is retried.
#[derive(Debug)]
enum AttemptError {
    Unreachable(InvocationError),
    Final(InvocationError),
}

impl AttemptError {
    fn from_send(err: reqwest::Error) -> Self {
        let error = InvocationError::RemoteFailed(format!("Request failed: {}", err));
        if err.is_connect() {
            AttemptError::Unreachable(error)
        } else {
            AttemptError::Final(error)
        }
    }
}

impl From<InvocationError> for AttemptError {
    fn from(err: InvocationError) -> Self {
        AttemptError::Final(err)
    }
}

pub struct HttpExecutionService {
    endpoint: String,
    connection: Arc<RemoteConnection>,
    max_retries: usize,
    retry_delay: Duration,
}

impl HttpExecutionService {
    pub fn new(endpoint: impl Into<String>, connection: Arc<RemoteConnection>) -> Self {
        Self {
            endpoint: endpoint.into(),
            connection,
            max_retries: 0,
            retry_delay: Duration::from_millis(250),
        }
    }

    /// Retry this many extra times when the service cannot be reached.
    /// Timeouts and error replies are never retried.
    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn connection(&self) -> &Arc<RemoteConnection> {
        &self.connection
    }

    async fn invoke_once(
        &self,
        code_ref: &str,
        credentials: &Credentials,
        params: &Value,
    ) -> Result<RemoteReply, AttemptError> {
        let client = self.connection.client()?;
        let request = ExecuteRequest {
            code_ref,
            credentials: RequestCredentials {
                signer: &credentials.signer,
                expires_at: credentials.expires_at,
            },
            js_params: params.clone(),
        };

        let response = client
            .post(&self.endpoint)
            .bearer_auth(&credentials.token)
            .json(&request)
            .send()
            .await
            .map_err(AttemptError::from_send)?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| InvocationError::RemoteFailed(format!("Failed to read body: {}", e)))?;

        if !status.is_success() {
            return Err(AttemptError::Final(InvocationError::RemoteFailed(format!(
                "Execution service returned {}: {}",
                status, body
            ))));
        }

        decode_reply(&body).map_err(AttemptError::Final)
    }
}

/// Decode the execution service's reply body.
pub fn decode_reply(body: &str) -> Result<RemoteReply, InvocationError> {
    serde_json::from_str(body).map_err(|e| {
        InvocationError::UnknownRemoteError(format!("Unexpected execution service reply: {}", e))
    })
}

#[async_trait]
impl RemoteExecutionService for HttpExecutionService {
    async fn invoke(
        &self,
        code_ref: &str,
        credentials: &Credentials,
        params: Value,
    ) -> Result<RemoteReply, InvocationError> {
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            debug!(
                "Remote execution of {} attempt {}/{}",
                code_ref,
                attempt + 1,
                self.max_retries + 1
            );

            match self.invoke_once(code_ref, credentials, &params).await {
                Ok(reply) => return Ok(reply),
                Err(AttemptError::Final(e)) => {
                    warn!("Remote execution of {} failed: {}", code_ref, e);
                    return Err(e);
                }
                Err(AttemptError::Unreachable(e)) => {
                    warn!("Remote execution failed (attempt {}): {}", attempt + 1, e);
                    last_error = Some(e);
                    if attempt < self.max_retries {
                        tokio::time::sleep(self.retry_delay).await;
                    }
                }
            }
        }

        Err(InvocationError::RemoteFailed(format!(
            "Remote execution failed after {} attempts: {}",
            self.max_retries + 1,
            last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "Unknown error".to_string())
        )))
    }

    async fn shutdown(&self) {
        self.connection.shutdown();
    }
}
