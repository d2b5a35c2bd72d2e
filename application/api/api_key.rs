//! The endpoint `gem signin` fetches its API key from.
use axum::extract::State;
use axum::Extension;
use tracing::info;

use crate::app_state::AppState;
use crate::auth::AuthenticatedIdentity;
use crate::error::{AppError, AppResult};

pub async fn get_api_key_handler(
    Extension(caller): Extension<AuthenticatedIdentity>,
    State(app_state): State<AppState>,
) -> AppResult<String> {
    // the password authenticator guarantees a secret
    let secret = caller.secret.as_deref().ok_or_else(|| {
        AppError::BadRequest("a password is required to issue an api key".to_string())
    })?;

    let credential = app_state.credentials.issue(&caller.identity, secret).await?;
    info!(identity = %caller.identity, issued_at = %credential.created_at, "handed out api key");

    Ok(credential.api_key)
}
