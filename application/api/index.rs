use axum::extract::{Path, State};
use axum::http::header::ACCEPT;
use axum::http::HeaderMap;
use axum::response::{Html, IntoResponse, Response};
use axum::Json;

use crate::app_state::AppState;
use crate::error::{AppError, AppResult};

pub async fn index_page(State(app_state): State<AppState>) -> Html<String> {
    let index = app_state.index.current();
    Html(app_state.renderer.page(&index))
}

pub async fn index_fragment(State(app_state): State<AppState>) -> Html<String> {
    let index = app_state.index.current();
    Html(app_state.renderer.fragment(&index))
}

pub async fn gem_details(
    Path(name): Path<String>,
    State(app_state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<Response> {
    let index = app_state.index.current();
    let entries = index.search(&name);
    if entries.is_empty() {
        return Err(AppError::NotFound(name));
    }

    if wants_json(&headers) {
        Ok(Json(entries).into_response())
    } else {
        Ok(Html(app_state.renderer.details(&name, &entries)).into_response())
    }
}

fn wants_json(headers: &HeaderMap) -> bool {
    headers
        .get_all(ACCEPT)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .any(|value| value.contains("application/json"))
}
