//! Local filesystem repository store.
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::TempPath;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

use crate::models::metadata::PackageIdentity;
use crate::storage::base::{
    is_same_gem, package_key, PackageStorage, ReadableByteStream, StorageError, StorageResult,
    StoredFile, StoredPackage,
};

/// Copy buffer size for streaming uploads to disk (64 KiB).
const COPY_CHUNK_SIZE: usize = 64 * 1024;

const PACKAGES_DIR: &str = "gems";
const TEMP_PREFIX: &str = ".incoming-";

#[derive(Clone, Debug)]
pub struct FilesystemStorage {
    root: PathBuf,
    /// Held from the equal-version check until the gem is in place.
    commit_lock: Arc<Mutex<()>>,
}

impl FilesystemStorage {
    pub async fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join(PACKAGES_DIR)).await?;
        let storage = Self {
            root,
            commit_lock: Arc::new(Mutex::new(())),
        };
        storage.remove_abandoned_temp_files().await?;

        Ok(storage)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a key below the root, rejecting anything that could escape it.
    fn key_path(&self, key: &str) -> StorageResult<PathBuf> {
        if key.is_empty() || key.starts_with('/') || key.starts_with('\\') {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        for component in Path::new(key).components() {
            match component {
                Component::Normal(part) if !part.to_string_lossy().starts_with('.') => {}
                _ => return Err(StorageError::InvalidKey(key.to_string())),
            }
        }

        Ok(self.root.join(key))
    }

    async fn ensure_parent(path: &Path) -> StorageResult<PathBuf> {
        let parent = path
            .parent()
            .ok_or_else(|| StorageError::InvalidKey(path.display().to_string()))?
            .to_path_buf();
        fs::create_dir_all(&parent).await?;

        Ok(parent)
    }

    /// Key of a stored gem with the same identity as `identity`, if any.
    async fn find_same_gem(&self, identity: &PackageIdentity) -> StorageResult<Option<String>> {
        let mut dir = fs::read_dir(self.root.join(PACKAGES_DIR)).await?;
        while let Some(entry) = dir.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.starts_with('.') && is_same_gem(identity, &name) {
                return Ok(Some(format!("{PACKAGES_DIR}/{name}")));
            }
        }

        Ok(None)
    }

    /// Write `data` to a temp file next to `key`, ready to be persisted.
    async fn stage(&self, key: &str, data: &[u8]) -> StorageResult<(TempPath, PathBuf)> {
        let path = self.key_path(key)?;
        let parent = Self::ensure_parent(&path).await?;

        let (mut file, temp_path) = Self::temp_file_in(&parent)?;
        file.write_all(data).await?;
        file.flush().await?;
        file.sync_all().await?;

        Ok((temp_path, path))
    }

    fn temp_file_in(dir: &Path) -> StorageResult<(fs::File, TempPath)> {
        let temp = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .tempfile_in(dir)?;
        let (file, path) = temp.into_parts();

        Ok((fs::File::from_std(file), path))
    }

    /// Temp files survive only if the process died mid-commit.
    async fn remove_abandoned_temp_files(&self) -> StorageResult<()> {
        for dir in [self.root.join(PACKAGES_DIR), self.root.clone()] {
            let mut entries = fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                if entry.file_name().to_string_lossy().starts_with(TEMP_PREFIX) {
                    warn!(path = %entry.path().display(), "removing abandoned temp file");
                    fs::remove_file(entry.path()).await?;
                }
            }
        }

        Ok(())
    }
}

fn map_not_found(key: &str) -> impl FnOnce(std::io::Error) -> StorageError + '_ {
    move |err| {
        if err.kind() == ErrorKind::NotFound {
            StorageError::NotFound(key.to_string())
        } else {
            StorageError::Io(err)
        }
    }
}

#[async_trait]
impl PackageStorage for FilesystemStorage {
    #[instrument(skip(self, bytes), fields(gem = %identity.full_name()))]
    async fn commit(
        &self,
        identity: &PackageIdentity,
        mut bytes: ReadableByteStream,
    ) -> StorageResult<StoredPackage> {
        let key = package_key(identity);
        let path = self.key_path(&key)?;
        let parent = Self::ensure_parent(&path).await?;

        if let Some(existing) = self.find_same_gem(identity).await? {
            return Err(StorageError::AlreadyExists(existing));
        }

        // Dropping `temp_path` on any early return (or when this future is
        // cancelled) deletes the partial file.
        let (mut file, temp_path) = Self::temp_file_in(&parent)?;
        let mut buf = vec![0u8; COPY_CHUNK_SIZE];
        let mut size = 0u64;
        loop {
            let n = bytes.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            file.write_all(&buf[..n]).await?;
            size += n as u64;
        }
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        // Checked again now that the upload is on disk: an equal version may
        // have been committed under another spelling in the meantime.
        let guard = self.commit_lock.clone().lock_owned().await;
        if let Some(existing) = self.find_same_gem(identity).await? {
            return Err(StorageError::AlreadyExists(existing));
        }

        let final_path = path.clone();
        let persisted = tokio::task::spawn_blocking(move || {
            let persisted = temp_path.persist_noclobber(final_path);
            drop(guard);
            persisted
        })
        .await
        .map_err(|err| std::io::Error::other(format!("persist task failed: {err}")))?;

        match persisted {
            Ok(()) => {
                info!(%key, size, "stored gem");
                Ok(StoredPackage { key, size })
            }
            Err(err) if err.error.kind() == ErrorKind::AlreadyExists => {
                Err(StorageError::AlreadyExists(key))
            }
            Err(err) => Err(StorageError::Io(err.error)),
        }
    }

    async fn list_packages(&self) -> StorageResult<Vec<StoredPackage>> {
        let mut packages = Vec::new();
        let mut dir = match fs::read_dir(self.root.join(PACKAGES_DIR)).await {
            Ok(dir) => dir,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(packages),
            Err(err) => return Err(err.into()),
        };

        while let Some(entry) = dir.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') || !name.ends_with(".gem") {
                continue;
            }
            let metadata = entry.metadata().await?;
            if metadata.is_file() {
                packages.push(StoredPackage {
                    key: format!("{PACKAGES_DIR}/{name}"),
                    size: metadata.len(),
                });
            }
        }
        packages.sort_by(|a, b| a.key.cmp(&b.key));

        Ok(packages)
    }

    async fn open(&self, key: &str) -> StorageResult<StoredFile> {
        let path = self.key_path(key)?;
        let file = fs::File::open(&path).await.map_err(map_not_found(key))?;
        let metadata = file.metadata().await?;
        if !metadata.is_file() {
            return Err(StorageError::NotFound(key.to_string()));
        }

        Ok(StoredFile {
            reader: Box::pin(file),
            size: metadata.len(),
        })
    }

    async fn replace(&self, key: &str, data: Vec<u8>) -> StorageResult<()> {
        self.replace_many(vec![(key.to_string(), data)]).await
    }

    async fn replace_many(&self, files: Vec<(String, Vec<u8>)>) -> StorageResult<()> {
        // Dropping `staged` on an early return deletes every temp file.
        let mut staged = Vec::with_capacity(files.len());
        for (key, data) in &files {
            staged.push(self.stage(key, data).await?);
        }

        tokio::task::spawn_blocking(move || {
            staged
                .into_iter()
                .try_for_each(|(temp_path, path)| temp_path.persist(path))
        })
        .await
        .map_err(|err| std::io::Error::other(format!("persist task failed: {err}")))?
        .map_err(|err| StorageError::Io(err.error))
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let dir_path = self.key_path(prefix)?;
        let mut keys = Vec::new();
        let mut dir = match fs::read_dir(&dir_path).await {
            Ok(dir) => dir,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(keys),
            Err(err) => return Err(err.into()),
        };

        while let Some(entry) = dir.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.starts_with('.') && entry.file_type().await?.is_file() {
                keys.push(format!("{}/{name}", prefix.trim_end_matches('/')));
            }
        }
        keys.sort();

        Ok(keys)
    }

    async fn remove(&self, key: &str) -> StorageResult<()> {
        let path = self.key_path(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}
