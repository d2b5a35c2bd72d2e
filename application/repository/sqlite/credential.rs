use time::OffsetDateTime;
use tracing::info;

use crate::auth::generate_api_key;
use crate::models::credential::Credential;
use crate::repository::base::{CredentialError, CredentialRepository, CredentialResult};
use crate::repository::SqliteCredentialRepository;

#[async_trait::async_trait]
impl CredentialRepository for SqliteCredentialRepository {
    async fn issue(&self, identity: &str, secret: &str) -> CredentialResult<Credential> {
        let candidate = generate_api_key(identity, secret);
        let inserted = sqlx::query(
            "INSERT INTO apikeys (user, apikey, created_at) VALUES (?, ?, ?) ON CONFLICT DO NOTHING",
        )
        .bind(identity)
        .bind(&candidate)
        .bind(OffsetDateTime::now_utc())
        .execute(&self.pool)
        .await?
        .rows_affected();

        if inserted > 0 {
            info!(identity, "issued api key");
        }

        self.lookup(identity)
            .await?
            .ok_or_else(|| CredentialError::NotIssued(identity.to_string()))
    }

    async fn lookup(&self, identity: &str) -> CredentialResult<Option<Credential>> {
        let credential = sqlx::query_as::<_, Credential>(
            "SELECT user, apikey, created_at FROM apikeys WHERE user = ?",
        )
        .bind(identity)
        .fetch_optional(&self.pool)
        .await?;

        Ok(credential)
    }

    async fn find_by_key(&self, api_key: &str) -> CredentialResult<Option<Credential>> {
        let credential = sqlx::query_as::<_, Credential>(
            "SELECT user, apikey, created_at FROM apikeys WHERE apikey = ?",
        )
        .bind(api_key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(credential)
    }

    async fn revoke(&self, identity: &str) -> CredentialResult<bool> {
        let removed = sqlx::query("DELETE FROM apikeys WHERE user = ?")
            .bind(identity)
            .execute(&self.pool)
            .await?
            .rows_affected();

        if removed > 0 {
            info!(identity, "revoked api key");
        }

        Ok(removed > 0)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::auth::{validate_key, API_KEY_LENGTH};
    use crate::repository::sqlite::IN_MEMORY;

    async fn repository() -> SqliteCredentialRepository {
        SqliteCredentialRepository::new(IN_MEMORY).await.unwrap()
    }

    #[tokio::test]
    async fn test_issue_is_idempotent() {
        let repository = repository().await;

        let first = repository.issue("jrandom", "hunter2").await.unwrap();
        let second = repository.issue("jrandom", "hunter2").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.identity, "jrandom");
        assert_eq!(first.api_key.len(), API_KEY_LENGTH);
        assert!(validate_key(&first.api_key, "jrandom", "hunter2"));
    }

    #[tokio::test]
    async fn test_key_exists_after_issue() {
        let repository = repository().await;

        let credential = repository.issue("jrandom", "hunter2").await.unwrap();

        assert!(repository.exists(&credential.api_key).await.unwrap());
        assert!(!repository.exists("not-a-key").await.unwrap());
        let found = repository.find_by_key(&credential.api_key).await.unwrap();
        assert_eq!(found.map(|c| c.identity), Some("jrandom".to_string()));
    }

    #[tokio::test]
    async fn test_lookup_unknown_identity() {
        let repository = repository().await;

        assert_eq!(repository.lookup("nobody").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_distinct_identities_get_distinct_keys() {
        let repository = repository().await;

        let a = repository.issue("alice", "same").await.unwrap();
        let b = repository.issue("bob", "same").await.unwrap();

        assert_ne!(a.api_key, b.api_key);
    }

    #[tokio::test]
    async fn test_revoke_removes_key() {
        let repository = repository().await;
        let credential = repository.issue("jrandom", "hunter2").await.unwrap();

        assert!(repository.revoke("jrandom").await.unwrap());
        assert!(!repository.revoke("jrandom").await.unwrap());
        assert!(!repository.exists(&credential.api_key).await.unwrap());

        let reissued = repository.issue("jrandom", "hunter2").await.unwrap();
        assert_ne!(reissued.api_key, credential.api_key);
    }

    #[tokio::test]
    async fn test_concurrent_issue_yields_one_key() {
        let repository = Arc::new(repository().await);

        let mut handles = Vec::new();
        for _ in 0..10 {
            let repository = repository.clone();
            handles.push(tokio::spawn(async move {
                repository.issue("jrandom", "hunter2").await.unwrap().api_key
            }));
        }

        let mut keys = Vec::new();
        for handle in handles {
            keys.push(handle.await.unwrap());
        }
        keys.dedup();
        assert_eq!(keys.len(), 1);
    }

    #[tokio::test]
    async fn test_file_store_survives_reopen() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("keys").join("gemvault.db");

        let issued = {
            let repository = SqliteCredentialRepository::new(&path).await.unwrap();
            repository.issue("jrandom", "hunter2").await.unwrap()
        };

        let repository = SqliteCredentialRepository::new(&path).await.unwrap();
        let found = repository.lookup("jrandom").await.unwrap().unwrap();
        assert_eq!(found.api_key, issued.api_key);
    }
}
