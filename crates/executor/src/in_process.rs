//! Execution service that runs registered tools in the current process.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use toolgate_core::{Credentials, InvocationError, RemoteExecutionService, RemoteReply};
use toolgate_tools::{ToolRegistry, ToolRunner};
use tracing::{info, warn};

pub struct InProcessExecutionService {
    registry: Arc<ToolRegistry>,
    invocations: AtomicUsize,
}

impl InProcessExecutionService {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            invocations: AtomicUsize::new(0),
        }
    }

    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }

    fn refuse(message: String) -> RemoteReply {
        warn!("In-process execution refused: {}", message);
        RemoteReply {
            success: false,
            response: Value::Null,
            error: Some(message),
        }
    }
}

#[async_trait]
impl RemoteExecutionService for InProcessExecutionService {
    async fn invoke(
        &self,
        code_ref: &str,
        credentials: &Credentials,
        params: Value,
    ) -> Result<RemoteReply, InvocationError> {
        self.invocations.fetch_add(1, Ordering::SeqCst);

        if credentials.is_expired() {
            return Ok(Self::refuse(format!(
                "credentials for {} expired",
                credentials.signer
            )));
        }
        let Some(tool) = self.registry.get_by_code_ref(code_ref) else {
            return Ok(Self::refuse(format!("no tool registered for {}", code_ref)));
        };

        info!("Executing {} in process", tool.name());
        match ToolRunner::new(tool).run_json(params).await {
            // Serialized like a real remote would, so callers exercise parsing.
            Ok(envelope) => Ok(RemoteReply {
                success: true,
                response: Value::String(envelope.to_string()),
                error: None,
            }),
            Err(e) => Ok(Self::refuse(e.to_string())),
        }
    }
}
