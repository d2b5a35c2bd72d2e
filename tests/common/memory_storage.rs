use std::collections::BTreeMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use gemvault::models::metadata::PackageIdentity;
use gemvault::storage::{
    is_same_gem, package_key, PackageStorage, ReadableByteStream, StorageError, StorageResult, StoredFile,
    StoredPackage,
};
use tokio::io::AsyncReadExt;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
pub struct MemoryStorage {
    data: RwLock<BTreeMap<String, Vec<u8>>>,
    fail_replace: AtomicBool,
}

impl MemoryStorage {
    pub async fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.data.read().await.get(key).cloned()
    }

    /// Make every later index file write fail, as on a full disk.
    pub fn fail_replace(&self, fail: bool) {
        self.fail_replace.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl PackageStorage for MemoryStorage {
    async fn commit(
        &self,
        identity: &PackageIdentity,
        mut bytes: ReadableByteStream,
    ) -> StorageResult<StoredPackage> {
        let key = package_key(identity);
        let mut data = Vec::new();
        bytes.read_to_end(&mut data).await?;

        let mut lock = self.data.write().await;
        let existing = lock.keys().find(|stored| {
            stored
                .strip_prefix("gems/")
                .is_some_and(|file_name| is_same_gem(identity, file_name))
        });
        if let Some(existing) = existing {
            return Err(StorageError::AlreadyExists(existing.clone()));
        }
        let size = data.len() as u64;
        lock.insert(key.clone(), data);

        Ok(StoredPackage { key, size })
    }

    async fn list_packages(&self) -> StorageResult<Vec<StoredPackage>> {
        let lock = self.data.read().await;
        let packages = lock
            .iter()
            .filter(|(key, _)| key.starts_with("gems/") && key.ends_with(".gem"))
            .map(|(key, data)| StoredPackage {
                key: key.clone(),
                size: data.len() as u64,
            })
            .collect();

        Ok(packages)
    }

    async fn open(&self, key: &str) -> StorageResult<StoredFile> {
        let data = self
            .get(key)
            .await
            .ok_or_else(|| StorageError::NotFound(key.to_string()))?;
        let size = data.len() as u64;

        Ok(StoredFile {
            reader: Box::pin(Cursor::new(data)),
            size,
        })
    }

    async fn replace(&self, key: &str, data: Vec<u8>) -> StorageResult<()> {
        if self.fail_replace.load(Ordering::SeqCst) {
            return Err(std::io::Error::other("no space left on device").into());
        }
        self.data.write().await.insert(key.to_string(), data);

        Ok(())
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let prefix = format!("{}/", prefix.trim_end_matches('/'));
        let lock = self.data.read().await;
        let keys = lock
            .keys()
            .filter(|key| {
                key.strip_prefix(&prefix)
                    .is_some_and(|rest| !rest.contains('/'))
            })
            .cloned()
            .collect();

        Ok(keys)
    }

    async fn remove(&self, key: &str) -> StorageResult<()> {
        self.data.write().await.remove(key);

        Ok(())
    }
}
