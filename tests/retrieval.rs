mod common;

use std::io::Read;

use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{Method, Request, StatusCode};
use flate2::read::{GzDecoder, ZlibDecoder};

use common::fixtures::gem;
use common::setup::{body_bytes, get, push, TestServer};

async fn server_with_widget() -> (TestServer, Vec<u8>) {
    let server = TestServer::new().await;
    let key = server.api_key().await;
    let widget = gem("widget", "0.1.0");
    let response = server.send(push(widget.clone(), &key)).await;
    assert_eq!(response.status(), StatusCode::OK);

    (server, widget)
}

#[tokio::test]
async fn test_stored_gem_is_served_as_is() {
    let (server, widget) = server_with_widget().await;

    let response = server.send(get("/gems/widget-0.1.0.gem")).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[CONTENT_TYPE], "application/octet-stream");
    assert_eq!(
        response.headers()[CONTENT_LENGTH],
        widget.len().to_string().as_str()
    );
    assert_eq!(body_bytes(response).await, widget);
}

#[tokio::test]
async fn test_gzipped_index_files() {
    let (server, _) = server_with_widget().await;

    for path in [
        "/specs.4.8.gz",
        "/latest_specs.4.8.gz",
        "/prerelease_specs.4.8.gz",
    ] {
        let response = server.send(get(path)).await;
        assert_eq!(response.status(), StatusCode::OK, "{path}");
        assert_eq!(response.headers()[CONTENT_TYPE], "application/x-gzip");

        let compressed = body_bytes(response).await;
        let mut plain = Vec::new();
        GzDecoder::new(compressed.as_slice())
            .read_to_end(&mut plain)
            .unwrap();
        assert_eq!(&plain[..2], b"\x04\x08", "{path} is not a marshal dump");
    }
}

#[tokio::test]
async fn test_plain_index_files() {
    let (server, _) = server_with_widget().await;

    let response = server.send(get("/specs.4.8")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[CONTENT_TYPE], "application/octet-stream");
    let specs = body_bytes(response).await;
    assert!(specs.windows(6).any(|window| window == b"widget"));

    let response = server.send(get("/yaml")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let yaml = String::from_utf8(body_bytes(response).await).unwrap();
    assert!(yaml.contains("widget"));
}

#[tokio::test]
async fn test_deflated_files() {
    let (server, _) = server_with_widget().await;

    for path in ["/quick/Marshal.4.8/widget-0.1.0.gemspec.rz", "/yaml.Z"] {
        let response = server.send(get(path)).await;
        assert_eq!(response.status(), StatusCode::OK, "{path}");
        assert_eq!(response.headers()[CONTENT_TYPE], "application/x-deflate");

        let compressed = body_bytes(response).await;
        let mut plain = Vec::new();
        ZlibDecoder::new(compressed.as_slice())
            .read_to_end(&mut plain)
            .unwrap();
        assert!(!plain.is_empty());
    }
}

#[tokio::test]
async fn test_missing_and_unlisted_files_are_not_found() {
    let (server, _) = server_with_widget().await;

    for path in [
        "/gems/widget-9.9.9.gem",
        "/gemvault.db",
        "/specs.4.7.gz",
        "/gems/../gemvault.db",
        "/gems/%2e%2e/specs.4.8",
        "/README",
    ] {
        let response = server.send(get(path)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{path}");
    }
}

#[tokio::test]
async fn test_only_reads_fall_through_to_files() {
    let (server, _) = server_with_widget().await;

    let request = Request::builder()
        .method(Method::DELETE)
        .uri("/gems/widget-0.1.0.gem")
        .body(axum::body::Body::empty())
        .unwrap();
    let response = server.send(request).await;

    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert!(server.root.path().join("gems/widget-0.1.0.gem").exists());
}
