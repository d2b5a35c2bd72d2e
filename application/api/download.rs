//! Serving of index files and stored gems straight from the repository.
use axum::body::Body;
use axum::extract::State;
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::Uri;
use axum::response::{IntoResponse, Response};
use tokio_util::io::ReaderStream;
use tracing::debug;

use crate::app_state::AppState;
use crate::error::{AppError, AppResult, GEM_CONTENT_TYPE};
use crate::index::MARSHAL_VERSION;
use crate::storage::StorageError;

const DEFLATE_CONTENT_TYPE: &str = "application/x-deflate";
const GZIP_CONTENT_TYPE: &str = "application/x-gzip";

/// Content type for a repository file, or `None` if it is not served.
pub fn content_type_for(key: &str) -> Option<&'static str> {
    if key.ends_with(".rz") || key.ends_with(".Z") {
        return Some(DEFLATE_CONTENT_TYPE);
    }
    if let Some(stem) = key.strip_suffix(".gz") {
        return stem
            .ends_with(&format!(".{MARSHAL_VERSION}"))
            .then_some(GZIP_CONTENT_TYPE);
    }
    if key == "yaml" || key.ends_with(&format!(".{MARSHAL_VERSION}")) || key.ends_with(".gem") {
        return Some(GEM_CONTENT_TYPE);
    }

    None
}

pub async fn serve_artifact(State(app_state): State<AppState>, uri: Uri) -> AppResult<Response> {
    let key = uri.path().trim_start_matches('/');
    let Some(content_type) = content_type_for(key) else {
        return Err(AppError::NotFound(key.to_string()));
    };

    let file = match app_state.storage.open(key).await {
        Ok(file) => file,
        // paths that could never name a stored file simply do not exist
        Err(StorageError::InvalidKey(_)) => return Err(AppError::NotFound(key.to_string())),
        Err(err) => return Err(err.into()),
    };
    debug!(key, size = file.size, content_type, "serving file");

    let body = Body::from_stream(ReaderStream::new(file.reader));
    Ok((
        [
            (CONTENT_TYPE, content_type.to_string()),
            (CONTENT_LENGTH, file.size.to_string()),
        ],
        body,
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deflated_files() {
        assert_eq!(
            content_type_for("quick/Marshal.4.8/widget-0.1.0.gemspec.rz"),
            Some(DEFLATE_CONTENT_TYPE)
        );
        assert_eq!(content_type_for("yaml.Z"), Some(DEFLATE_CONTENT_TYPE));
    }

    #[test]
    fn test_gzipped_index_files() {
        assert_eq!(content_type_for("specs.4.8.gz"), Some(GZIP_CONTENT_TYPE));
        assert_eq!(
            content_type_for("prerelease_specs.4.8.gz"),
            Some(GZIP_CONTENT_TYPE)
        );
        assert_eq!(content_type_for("data.tar.gz"), None);
    }

    #[test]
    fn test_plain_files() {
        assert_eq!(content_type_for("specs.4.8"), Some(GEM_CONTENT_TYPE));
        assert_eq!(content_type_for("yaml"), Some(GEM_CONTENT_TYPE));
        assert_eq!(
            content_type_for("gems/widget-0.1.0.gem"),
            Some(GEM_CONTENT_TYPE)
        );
    }

    #[test]
    fn test_everything_else_is_not_served() {
        assert_eq!(content_type_for("gemvault.db"), None);
        assert_eq!(content_type_for("tmp/upload-abc"), None);
        assert_eq!(content_type_for("gems/yaml"), None);
        assert_eq!(content_type_for(""), None);
    }
}
