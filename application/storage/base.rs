use std::pin::Pin;
use std::sync::Arc;

use thiserror::Error;
use tokio::io::AsyncRead;

use crate::models::metadata::{PackageIdentity, DEFAULT_PLATFORM};
use crate::models::version::GemVersion;

/// Any source of bytes: a request body, a spooled upload, a stored file.
pub type ReadableByteStream = Pin<Box<dyn AsyncRead + Send>>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("{0} already exists")]
    AlreadyExists(String),
    #[error("{0} does not exist")]
    NotFound(String),
    #[error("invalid storage key: {0}")]
    InvalidKey(String),
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// A gem archive that has been committed to the repository.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredPackage {
    pub key: String,
    pub size: u64,
}

pub struct StoredFile {
    pub reader: ReadableByteStream,
    pub size: u64,
}

/// Durable storage for gem archives and the index files derived from them.
///
/// Keys are `/`-separated paths relative to the repository root, for example
/// `gems/widget-0.1.0.gem` or `specs.4.8.gz`.
#[async_trait::async_trait]
pub trait PackageStorage: Send + Sync {
    /// Store a gem under the key derived from `identity`. Never overwrites: if
    /// a gem with an equal identity is stored, including one committed
    /// concurrently or one whose version is spelled differently (`1.0` and
    /// `1`), this fails with [`StorageError::AlreadyExists`] and leaves the
    /// stored bytes untouched. A failed or abandoned commit leaves nothing at
    /// the final key.
    async fn commit(
        &self,
        identity: &PackageIdentity,
        bytes: ReadableByteStream,
    ) -> StorageResult<StoredPackage>;

    async fn list_packages(&self) -> StorageResult<Vec<StoredPackage>>;

    async fn open(&self, key: &str) -> StorageResult<StoredFile>;

    /// Atomically replace the content at `key`. Readers see either the old
    /// or the new content, never a mix.
    async fn replace(&self, key: &str, data: Vec<u8>) -> StorageResult<()>;

    /// Replace several files. Nothing is replaced unless every file could be
    /// prepared; after that each file is still swapped in on its own.
    async fn replace_many(&self, files: Vec<(String, Vec<u8>)>) -> StorageResult<()> {
        for (key, data) in files {
            self.replace(&key, data).await?;
        }

        Ok(())
    }

    /// Keys of the files directly under `prefix`.
    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>>;

    async fn remove(&self, key: &str) -> StorageResult<()>;
}

pub type DynPackageStorage = Arc<dyn PackageStorage>;

pub fn package_key(identity: &PackageIdentity) -> String {
    format!("gems/{}", identity.file_name())
}

/// Whether the stored gem file `file_name` holds `identity`, possibly under
/// another spelling of an equal version (`widget-1.0.gem` for `widget 1`).
pub fn is_same_gem(identity: &PackageIdentity, file_name: &str) -> bool {
    let Some(rest) = file_name
        .strip_prefix(identity.name.as_str())
        .and_then(|rest| rest.strip_prefix('-'))
        .and_then(|rest| rest.strip_suffix(".gem"))
    else {
        return false;
    };
    let (version, platform) = rest.split_once('-').unwrap_or((rest, DEFAULT_PLATFORM));

    platform == identity.platform
        && GemVersion::parse(version).is_ok_and(|version| version == identity.version)
}
