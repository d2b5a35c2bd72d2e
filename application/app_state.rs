use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use crate::auth::{AuthGate, DynAuthOracle};
use crate::config::AppConfig;
use crate::index::IndexBuilder;
use crate::render::{DynIndexRenderer, HtmlRenderer};
use crate::repository::{DynCredentialRepository, SqliteCredentialRepository};
use crate::storage::{DynPackageStorage, FilesystemStorage};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub storage: DynPackageStorage,
    pub index: Arc<IndexBuilder>,
    pub credentials: DynCredentialRepository,
    pub gate: Arc<AuthGate>,
    pub renderer: DynIndexRenderer,
}

impl AppState {
    /// Open the repository and the credential store described by `config`.
    pub async fn new(config: AppConfig, oracle: DynAuthOracle) -> anyhow::Result<Self> {
        let storage: DynPackageStorage = Arc::new(
            FilesystemStorage::new(&config.repository.root)
                .await
                .with_context(|| {
                    format!(
                        "failed to open repository at {}",
                        config.repository.root.display()
                    )
                })?,
        );
        clear_spool(&config).await?;

        let credentials: DynCredentialRepository = Arc::new(
            SqliteCredentialRepository::new(config.keystore_path())
                .await
                .context("failed to open credential store")?,
        );
        if config.keystore_in_memory() {
            warn!("api keys are kept in memory and will not survive a restart");
        }

        let gate = Arc::new(AuthGate::new(
            oracle,
            credentials.clone(),
            config.auth.realm.clone(),
        ));
        let renderer: DynIndexRenderer = Arc::new(HtmlRenderer::default());

        Ok(Self {
            index: Arc::new(IndexBuilder::new(storage.clone())),
            config: Arc::new(config),
            storage,
            credentials,
            gate,
            renderer,
        })
    }
}

/// Uploads still in the spool belong to requests that no longer exist.
async fn clear_spool(config: &AppConfig) -> anyhow::Result<()> {
    let spool = config.spool_dir();
    match tokio::fs::remove_dir_all(&spool).await {
        Ok(()) => info!(path = %spool.display(), "cleared upload spool"),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => {
            return Err(err).with_context(|| format!("failed to clear {}", spool.display()))
        }
    }
    tokio::fs::create_dir_all(&spool)
        .await
        .with_context(|| format!("failed to create {}", spool.display()))
}
