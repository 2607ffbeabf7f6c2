use async_trait::async_trait;
use chrono::{Duration, Utc};
use toolgate_core::{Credentials, InvocationError, SessionProvider};
use tracing::debug;

/// Issues credentials with a fixed token and a fixed lifetime.
pub struct StaticSessionProvider {
    token: String,
    ttl: Duration,
}

impl StaticSessionProvider {
    pub fn new(token: impl Into<String>, ttl: Duration) -> Self {
        Self {
            token: token.into(),
            ttl,
        }
    }
}

#[async_trait]
impl SessionProvider for StaticSessionProvider {
    async fn issue(&self, signer: &str) -> Result<Credentials, InvocationError> {
        if signer.is_empty() {
            return Err(InvocationError::Credentials(
                "cannot issue credentials for an empty signer".to_string(),
            ));
        }
        debug!("Issuing credentials for {}", signer);
        Ok(Credentials {
            signer: signer.to_string(),
            token: self.token.clone(),
            expires_at: Utc::now() + self.ttl,
        })
    }
}
