//! Turns whatever the remote environment returned into a [`ToolResponse`].
//!
//! The remote environment is untrusted: its payload must parse, must match
//! the envelope, must be about the code we asked for, and its result is
//! re-classified and re-validated against the tool's own execute contracts.

use serde_json::Value;
use toolgate_core::{
    classify_and_validate, Discriminant, InvocationContext, InvocationError, Outcome, Phase,
    RemoteEnvelope, RemoteReply, ResultContracts, Stage, ToolResponse,
};
use tracing::{debug, warn};

/// Reconcile a remote reply for the invocation described by `local`.
///
/// Transport-level problems (remote `success: false`, unparseable payload,
/// envelope mismatch) are errors. Everything else becomes a response.
pub fn reconcile(
    reply: RemoteReply,
    contracts: &ResultContracts,
    local: &InvocationContext,
) -> Result<ToolResponse, InvocationError> {
    if !reply.success {
        let message = reply
            .error
            .unwrap_or_else(|| "remote reported failure without detail".to_string());
        warn!("Remote execution of {} failed: {}", local.tool_code_ref(), message);
        return Err(InvocationError::RemoteFailed(message));
    }

    let envelope = decode_envelope(reply.response)?;
    let RemoteEnvelope {
        tool_execution_result: result,
        tool_context,
    } = envelope;

    if tool_context.tool_code_ref() != local.tool_code_ref()
        || tool_context.delegation() != local.delegation()
    {
        return Err(InvocationError::UnknownRemoteError(format!(
            "remote context is for {} but {} was invoked",
            tool_context.tool_code_ref(),
            local.tool_code_ref()
        )));
    }
    // The app binding resolved from the registry is authoritative when present.
    if local.app_id().is_some()
        && (tool_context.app_id() != local.app_id()
            || tool_context.app_version() != local.app_version())
    {
        return Err(InvocationError::UnknownRemoteError(format!(
            "remote context is bound to app {:?} v{:?} but {:?} v{:?} was resolved",
            tool_context.app_id(),
            tool_context.app_version(),
            local.app_id(),
            local.app_version()
        )));
    }

    let context = match local.rpc_url() {
        Some(rpc_url) => tool_context.with_rpc_url(rpc_url),
        None => tool_context,
    };

    if let Some(schema_error) = result.schema_validation_error.clone() {
        debug!("Remote reported schema failure: {}", schema_error);
        let mut response = ToolResponse::failed(context).with_schema_error(schema_error);
        if let Some(error) = result.runtime_error {
            response = response.with_runtime_error(error);
        }
        return Ok(response);
    }

    let Some(policies) = context.policies_context() else {
        return Err(InvocationError::UnknownRemoteError(
            "remote context carries no policy evaluation".to_string(),
        ));
    };
    if !policies.is_allowed() {
        debug!("Remote policy evaluation denied {}", context.tool_code_ref());
        return Ok(ToolResponse::failed(context));
    }

    if !result.success && result.result.is_none() {
        if let Some(error) = &result.runtime_error {
            return Ok(ToolResponse::failed(context).with_runtime_error(error.clone()));
        }
    }

    let response = match classify_and_validate(
        &result.to_wrapper(),
        Discriminant::Success,
        contracts,
        Phase::Execute,
        Stage::Output,
    ) {
        Ok(Outcome::Success(payload)) => ToolResponse::succeeded(payload.into_typed(), context),
        Ok(Outcome::Failure { payload, error }) => {
            let response = ToolResponse::failed(context).with_result(payload.into_typed());
            match error {
                Some(error) => response.with_runtime_error(error),
                None => response,
            }
        }
        Err(schema_error) => {
            warn!("Remote result failed its contract: {}", schema_error);
            ToolResponse::failed(context).with_schema_error(schema_error)
        }
    };

    Ok(response)
}

fn decode_envelope(response: Value) -> Result<RemoteEnvelope, InvocationError> {
    let payload = match response {
        Value::String(text) => serde_json::from_str(&text).map_err(|e| {
            InvocationError::UnknownRemoteError(format!("unparseable response: {}", e))
        })?,
        Value::Null => {
            return Err(InvocationError::UnknownRemoteError(
                "empty response".to_string(),
            ))
        }
        structured => structured,
    };

    serde_json::from_value(payload).map_err(|e| {
        InvocationError::UnknownRemoteError(format!("unexpected response envelope: {}", e))
    })
}
