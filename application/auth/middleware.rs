use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;

use crate::auth::gate::{AuthGate, AuthPolicy};
use crate::error::{AppError, AppResult};

async fn authenticate(
    gate: &AuthGate,
    policy: AuthPolicy,
    mut request: Request,
    next: Next,
) -> AppResult<Response> {
    let identity = gate
        .authenticate(request.headers(), policy)
        .await
        .map_err(|rejection| AppError::from_rejection(rejection, gate.realm()))?;

    request.extensions_mut().insert(identity);
    Ok(next.run(request).await)
}

/// Password or API key, for browser and command-line uploads.
pub async fn upload_authenticator(
    State(gate): State<Arc<AuthGate>>,
    request: Request,
    next: Next,
) -> AppResult<Response> {
    authenticate(&gate, AuthPolicy::BasicOrKey, request, next).await
}

/// API key only, as sent by `gem push`.
pub async fn api_key_authenticator(
    State(gate): State<Arc<AuthGate>>,
    request: Request,
    next: Next,
) -> AppResult<Response> {
    authenticate(&gate, AuthPolicy::KeyOnly, request, next).await
}

/// Password only; issuing a key needs the password it is derived from.
pub async fn password_authenticator(
    State(gate): State<Arc<AuthGate>>,
    request: Request,
    next: Next,
) -> AppResult<Response> {
    authenticate(&gate, AuthPolicy::BasicOnly, request, next).await
}
