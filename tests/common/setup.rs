use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{Method, Request};
use axum::response::Response;
use axum::Router;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use gemvault::api::build_router;
use gemvault::app_state::AppState;
use gemvault::auth::{AuthGate, AuthOracle};
use gemvault::config::AppConfig;
use gemvault::index::IndexBuilder;
use gemvault::render::HtmlRenderer;
use gemvault::repository::{SqliteCredentialRepository, IN_MEMORY};
use gemvault::storage::DynPackageStorage;
use tempfile::TempDir;
use tower::ServiceExt;

pub const USERNAME: &str = "jrandom";
pub const PASSWORD: &str = "hunter2";

const BOUNDARY: &str = "----gemvault-test-boundary";

/// A directory that knows a fixed set of users and counts how often it is
/// asked.
#[derive(Debug)]
pub struct FakeOracle {
    users: HashMap<String, String>,
    calls: AtomicUsize,
}

impl FakeOracle {
    pub fn new() -> Self {
        Self {
            users: HashMap::from([(USERNAME.to_string(), PASSWORD.to_string())]),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AuthOracle for FakeOracle {
    async fn bind(&self, identity: &str, secret: &str) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.users.get(identity).is_some_and(|password| password == secret)
    }
}

pub struct TestServer {
    pub router: Router,
    pub state: AppState,
    pub oracle: Arc<FakeOracle>,
    pub root: TempDir,
}

impl TestServer {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// A server on a fresh temporary repository, with `configure` applied to
    /// its configuration first.
    pub async fn with_config(configure: impl FnOnce(&mut AppConfig)) -> Self {
        let root = tempfile::tempdir().unwrap();
        let mut config = test_config(&root);
        configure(&mut config);

        let oracle = Arc::new(FakeOracle::new());
        let state = AppState::new(config, oracle.clone()).await.unwrap();
        state.index.regenerate().await.unwrap();

        Self {
            router: build_router(state.clone()),
            state,
            oracle,
            root,
        }
    }

    /// A server whose gems and index files live in `storage`.
    pub async fn with_storage(storage: DynPackageStorage) -> Self {
        let root = tempfile::tempdir().unwrap();
        let config = test_config(&root);

        let oracle = Arc::new(FakeOracle::new());
        let credentials = Arc::new(SqliteCredentialRepository::new(IN_MEMORY).await.unwrap());
        let gate = Arc::new(AuthGate::new(
            oracle.clone(),
            credentials.clone(),
            config.auth.realm.clone(),
        ));
        let state = AppState {
            config: Arc::new(config),
            index: Arc::new(IndexBuilder::new(storage.clone())),
            storage,
            credentials,
            gate,
            renderer: Arc::new(HtmlRenderer::default()),
        };

        Self {
            router: build_router(state.clone()),
            state,
            oracle,
            root,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        self.router.clone().oneshot(request).await.unwrap()
    }

    /// Issue an API key for the default user through the HTTP API.
    pub async fn api_key(&self) -> String {
        let response = self
            .send(get_with_auth("/api/v1/api_key", &basic(USERNAME, PASSWORD)))
            .await;
        assert_eq!(response.status(), 200);

        body_string(response).await
    }
}

fn test_config(root: &TempDir) -> AppConfig {
    let mut config = AppConfig::default();
    config.repository.root = root.path().to_path_buf();
    config.keystore.path = Some(IN_MEMORY.into());

    config
}

pub fn basic(username: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{username}:{password}")))
}

pub fn get(path: &str) -> Request<Body> {
    Request::builder().uri(path).body(Body::empty()).unwrap()
}

pub fn get_with_auth(path: &str, authorization: &str) -> Request<Body> {
    Request::builder()
        .uri(path)
        .header(AUTHORIZATION, authorization)
        .body(Body::empty())
        .unwrap()
}

/// A multipart form upload with the given fields, as a browser would send it.
pub fn multipart(fields: &[(&str, &str, &[u8])], authorization: Option<&str>) -> Request<Body> {
    let mut body = Vec::new();
    for (name, file_name, data) in fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    let mut builder = Request::builder()
        .method(Method::POST)
        .uri("/upload")
        .header(
            CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        );
    if let Some(authorization) = authorization {
        builder = builder.header(AUTHORIZATION, authorization);
    }

    builder.body(Body::from(body)).unwrap()
}

pub fn upload(gem: &[u8], file_name: &str, authorization: Option<&str>) -> Request<Body> {
    multipart(&[("gem", file_name, gem)], authorization)
}

/// A `gem push` request.
pub fn push(gem: Vec<u8>, authorization: &str) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/api/v1/gems")
        .header(AUTHORIZATION, authorization)
        .header(CONTENT_TYPE, "application/octet-stream")
        .body(Body::from(gem))
        .unwrap()
}

pub async fn body_bytes(response: Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

pub async fn body_string(response: Response) -> String {
    String::from_utf8(body_bytes(response).await).unwrap()
}

pub async fn body_json(response: Response) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}
