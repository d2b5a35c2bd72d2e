mod api_key;
mod download;
mod index;
mod publish;
mod upload;

use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post, Router};
use tower_http::trace::TraceLayer;

use crate::api::api_key::get_api_key_handler;
use crate::api::download::serve_artifact;
use crate::api::index::{gem_details, index_fragment, index_page};
use crate::api::publish::push_gem_handler;
use crate::api::upload::upload_gem_handler;
use crate::app_state::AppState;
use crate::auth::{api_key_authenticator, password_authenticator, upload_authenticator};

/// Room for multipart boundaries and headers around the gem itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

pub fn build_router(app_state: AppState) -> Router {
    let gate = app_state.gate.clone();
    let body_limit = usize::try_from(app_state.config.server.max_upload_size)
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD);

    let upload_router = Router::new()
        .route("/upload", post(upload_gem_handler))
        .layer(middleware::from_fn_with_state(
            gate.clone(),
            upload_authenticator,
        ));
    let push_router = Router::new()
        .route("/api/v1/gems", post(push_gem_handler))
        .layer(middleware::from_fn_with_state(
            gate.clone(),
            api_key_authenticator,
        ));
    let api_key_router = Router::new()
        .route("/api/v1/api_key", get(get_api_key_handler))
        .layer(middleware::from_fn_with_state(gate, password_authenticator));

    Router::new()
        .route("/", get(index_page))
        .route("/gems", get(index_fragment))
        .route("/details/:name", get(gem_details))
        .merge(upload_router)
        .merge(push_router)
        .merge(api_key_router)
        .fallback(get(serve_artifact))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}
