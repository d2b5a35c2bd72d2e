use std::io::BufReader;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::Extension;
use tracing::{error, info};

use crate::app_state::AppState;
use crate::auth::AuthenticatedIdentity;
use crate::error::{AppError, AppResult};
use crate::index::IndexBuilder;
use crate::models::metadata::{GemMetadata, PackageIdentity};
use crate::storage::{DynPackageStorage, ReadableByteStream, SpoolError, SpooledUpload};
use crate::validator;

/// `gem push`: the request body is the gem archive itself.
pub async fn push_gem_handler(
    Extension(publisher): Extension<AuthenticatedIdentity>,
    State(app_state): State<AppState>,
    body: Body,
) -> AppResult<String> {
    let upload = SpooledUpload::from_stream(
        &app_state.config.spool_dir(),
        body.into_data_stream(),
        app_state.config.server.max_upload_size,
    )
    .await?;
    let metadata = publish(&app_state, upload, &publisher).await?;

    Ok(format!(
        "Successfully registered gem: {} ({})",
        metadata.name, metadata.version
    ))
}

/// Validate a spooled upload, store it and bring the index up to date.
///
/// Returns only after an index that includes the new gem is in place. Once
/// the upload has been validated, storing and reindexing run to completion
/// even if the client goes away.
pub async fn publish(
    app_state: &AppState,
    upload: SpooledUpload,
    publisher: &AuthenticatedIdentity,
) -> AppResult<GemMetadata> {
    let reader = upload.reader().map_err(SpoolError::from)?;
    let metadata =
        tokio::task::spawn_blocking(move || validator::validate(BufReader::new(reader))).await??;
    let identity = metadata.identity();

    info!(
        name = %metadata.name,
        version = %metadata.version,
        platform = %metadata.platform,
        publisher = %publisher.identity,
        size = upload.size(),
        "publishing gem"
    );

    let bytes = upload.byte_stream().map_err(SpoolError::from)?;
    let storage = app_state.storage.clone();
    let index = app_state.index.clone();
    tokio::spawn(async move {
        let result = commit_and_reindex(storage, index, identity, bytes).await;
        // the spooled copy is only needed until the commit is done
        drop(upload);
        result
    })
    .await??;

    Ok(metadata)
}

async fn commit_and_reindex(
    storage: DynPackageStorage,
    index: Arc<IndexBuilder>,
    identity: PackageIdentity,
    bytes: ReadableByteStream,
) -> AppResult<()> {
    let stored = storage.commit(&identity, bytes).await?;
    let full_name = identity.full_name();

    if let Err(err) = index.regenerate().await {
        error!(
            gem = %full_name,
            error = %err,
            "gem was stored but the index could not be regenerated"
        );
        return Err(AppError::IndexStale);
    }
    info!(gem = %full_name, key = %stored.key, "published gem");

    Ok(())
}
