use thiserror::Error;

use crate::models::credential::Credential;

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("credential store error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("failed to prepare credential store: {0}")]
    Io(#[from] std::io::Error),
    #[error("no credential could be issued for {0}")]
    NotIssued(String),
}

pub type CredentialResult<T> = Result<T, CredentialError>;

/// Persistent mapping from identity to the API key issued for it.
#[async_trait::async_trait]
pub trait CredentialRepository: Send + Sync {
    /// Issue a key for `identity`, or return the one it already has. Concurrent
    /// calls for the same identity all return the same key.
    async fn issue(&self, identity: &str, secret: &str) -> CredentialResult<Credential>;

    async fn lookup(&self, identity: &str) -> CredentialResult<Option<Credential>>;

    async fn find_by_key(&self, api_key: &str) -> CredentialResult<Option<Credential>>;

    async fn exists(&self, api_key: &str) -> CredentialResult<bool> {
        Ok(self.find_by_key(api_key).await?.is_some())
    }

    /// Remove the credential for `identity`; returns whether one existed.
    async fn revoke(&self, identity: &str) -> CredentialResult<bool>;
}
