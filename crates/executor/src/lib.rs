//! Remote side of an invocation: the transports that reach the execution
//! environment and the reconciler that makes sense of what comes back.

pub mod connection;
pub mod http;
pub mod in_process;
pub mod reconciler;
pub mod session;

pub use connection::RemoteConnection;
pub use http::{decode_reply, HttpExecutionService};
pub use in_process::InProcessExecutionService;
pub use reconciler::reconcile;
pub use session::StaticSessionProvider;
