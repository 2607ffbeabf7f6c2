use crate::types::BodyError;
use serde_json::Value;
use std::future::Future;
use tracing::error;

/// Run a user-supplied body on its own task so a panic cannot take down the
/// caller. Errors and panics both come back as a message.
pub async fn run_isolated<F>(label: &str, body: F) -> Result<Value, String>
where
    F: Future<Output = Result<Value, BodyError>> + Send + 'static,
{
    match tokio::spawn(body).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(err.to_string()),
        Err(join_err) => {
            if join_err.is_panic() {
                error!("{} panicked", label);
                Err(format!("{label} panicked"))
            } else {
                error!("{} cancelled", label);
                Err(format!("{label} cancelled"))
            }
        }
    }
}
