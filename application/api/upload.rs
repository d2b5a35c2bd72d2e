use axum::extract::{Multipart, State};
use axum::{Extension, Json};
use tracing::debug;

use crate::api::publish::publish;
use crate::app_state::AppState;
use crate::auth::AuthenticatedIdentity;
use crate::error::{AppError, AppResult};
use crate::models::metadata::GemMetadata;
use crate::storage::SpooledUpload;

const GEM_FIELD: &str = "gem";

/// Browser and form uploads: the gem arrives as the `gem` field of a
/// multipart form.
pub async fn upload_gem_handler(
    Extension(publisher): Extension<AuthenticatedIdentity>,
    State(app_state): State<AppState>,
    mut multipart: Multipart,
) -> AppResult<Json<GemMetadata>> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::BadRequest(err.body_text()))?
    {
        if field.name() != Some(GEM_FIELD) {
            debug!(field = ?field.name(), "ignoring form field");
            continue;
        }

        let upload = SpooledUpload::from_stream(
            &app_state.config.spool_dir(),
            field,
            app_state.config.server.max_upload_size,
        )
        .await?;
        let metadata = publish(&app_state, upload, &publisher).await?;

        return Ok(Json(metadata));
    }

    Err(AppError::BadRequest(format!(
        "no `{GEM_FIELD}` field in the upload"
    )))
}
