use std::collections::HashSet;
use std::io::BufReader;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::Mutex;
use tokio_util::io::SyncIoBridge;
use tracing::{debug, info, instrument, warn};

use super::artifacts::{self, QUICK_DIR};
use super::{IndexError, IndexResult};
use crate::models::index::{IndexEntry, RepositoryIndex};
use crate::models::metadata::GemMetadata;
use crate::storage::{package_key, DynPackageStorage, StorageError, StoredPackage};
use crate::validator;

/// Rebuilds the repository index from the stored gems.
///
/// Rebuilds run one at a time. Callers that queue up behind a rebuild which
/// already started after their own commit share that rebuild's result
/// instead of starting another.
pub struct IndexBuilder {
    storage: DynPackageStorage,
    rebuild_lock: Mutex<()>,
    /// Number of regeneration requests made so far.
    requested: AtomicU64,
    /// Highest request number that a finished rebuild is known to reflect.
    completed: AtomicU64,
    generation: AtomicU64,
    current: RwLock<Arc<RepositoryIndex>>,
}

impl IndexBuilder {
    pub fn new(storage: DynPackageStorage) -> Self {
        Self {
            storage,
            rebuild_lock: Mutex::new(()),
            requested: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            generation: AtomicU64::new(0),
            current: RwLock::new(Arc::new(RepositoryIndex::default())),
        }
    }

    /// The index produced by the most recent successful rebuild.
    pub fn current(&self) -> Arc<RepositoryIndex> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[cfg(test)]
    fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Return an index that reflects every gem committed before this call.
    pub async fn regenerate(&self) -> IndexResult<Arc<RepositoryIndex>> {
        let ticket = self.requested.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = self.rebuild_lock.lock().await;

        if self.completed.load(Ordering::SeqCst) >= ticket {
            debug!(ticket, "index already rebuilt since request");
            return Ok(self.current());
        }

        // Everything requested up to here was committed before the scan below.
        let covers = self.requested.load(Ordering::SeqCst);
        let index = Arc::new(self.rebuild().await?);

        *self.current.write().unwrap_or_else(PoisonError::into_inner) = index.clone();
        self.completed.store(covers, Ordering::SeqCst);
        self.generation.fetch_add(1, Ordering::SeqCst);

        Ok(index)
    }

    #[instrument(skip(self))]
    async fn rebuild(&self) -> IndexResult<RepositoryIndex> {
        let packages = self.storage.list_packages().await?;

        let mut entries = Vec::with_capacity(packages.len());
        for package in packages {
            if let Some(metadata) = self.read_metadata(&package).await? {
                entries.push(IndexEntry {
                    metadata,
                    size: package.size,
                });
            }
        }
        let index = RepositoryIndex::new(entries);

        self.write_artifacts(&index).await?;
        info!(
            release = index.release().len(),
            prerelease = index.prerelease().len(),
            "regenerated index"
        );

        Ok(index)
    }

    /// Metadata of a stored gem, or `None` when the file cannot be indexed.
    async fn read_metadata(&self, package: &StoredPackage) -> IndexResult<Option<GemMetadata>> {
        let file = match self.storage.open(&package.key).await {
            Ok(file) => file,
            Err(StorageError::NotFound(_)) => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        let reader = SyncIoBridge::new(file.reader);
        let validated =
            tokio::task::spawn_blocking(move || validator::validate(BufReader::new(reader)))
                .await
                .map_err(|err| IndexError::Interrupted(err.to_string()))?;

        match validated {
            Ok(metadata) if package_key(&metadata.identity()) == package.key => Ok(Some(metadata)),
            Ok(metadata) => {
                warn!(
                    key = %package.key,
                    gem = %metadata.full_name(),
                    "stored gem file name does not match its specification, skipping"
                );
                Ok(None)
            }
            Err(err) => {
                warn!(key = %package.key, error = %err, "skipping unreadable stored gem");
                Ok(None)
            }
        }
    }

    /// Every artifact is encoded before any is written. The index files are
    /// then written as one batch, so a failure leaves the previous set.
    async fn write_artifacts(&self, index: &RepositoryIndex) -> IndexResult<()> {
        let quick_specs = index
            .entries()
            .map(|entry| artifacts::quick_spec(&entry.metadata))
            .collect::<IndexResult<Vec<_>>>()?;
        let index_files = artifacts::index_files(index)?;
        let quick_keys: HashSet<String> = quick_specs.iter().map(|a| a.key.clone()).collect();

        // quick specs first, so every gem a spec list names can be resolved
        self.storage
            .replace_many(quick_specs.into_iter().map(|a| (a.key, a.data)).collect())
            .await?;
        self.storage
            .replace_many(index_files.into_iter().map(|a| (a.key, a.data)).collect())
            .await?;

        for key in self.storage.list(QUICK_DIR).await? {
            if !quick_keys.contains(&key) {
                debug!(%key, "removing stale quick spec");
                self.storage.remove(&key).await?;
            }
        }

        Ok(())
    }
}
