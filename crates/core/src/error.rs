use thiserror::Error;

/// Conditions under which an invocation could not be adjudicated at all.
///
/// Schema failures, policy denials and body errors are never reported through
/// this type; they are encoded in [`crate::ToolResponse`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InvocationError {
    #[error("Permission registry error: {0}")]
    Registry(String),

    #[error("Policy {policy} is configured but not supported by tool {tool}")]
    UnsupportedPolicy { tool: String, policy: String },

    #[error("Credential error: {0}")]
    Credentials(String),

    #[error("Remote execution failed: {0}")]
    RemoteFailed(String),

    #[error("Remote execution failed with unknown error: {0}")]
    UnknownRemoteError(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Config error: {0}")]
    Config(String),
}
