use crate::{
    media::MediaStore,
    server::{ServerState, app},
};
use axum::{
    Router,
    body::Body,
    extract::ConnectInfo,
    http::{Method, Request, StatusCode, header},
};
use devsphere_common::snowflake::{ProcessId, WorkerId};
use devsphere_db::client::DbClient;
use http_body_util::BodyExt;
use serde_json::Value;
use std::{net::SocketAddr, path::PathBuf, sync::Arc};
use tempfile::TempDir;
use tower::ServiceExt;

const BOUNDARY: &str = "devsphere-test-boundary";

/// The full application on the memory backend, with media in a temporary directory.
pub struct TestApp {
    router: Router,
    _media_dir: TempDir,
}

impl TestApp {
    pub fn new() -> Self {
        let media_dir = tempfile::tempdir().unwrap();
        let root = media_dir.path().to_owned();
        Self::with_media_root(media_dir, root)
    }

    /// Media root is a plain file, so every upload fails.
    pub fn with_broken_media() -> Self {
        let media_dir = tempfile::tempdir().unwrap();
        let root = media_dir.path().join("not-a-directory");
        std::fs::write(&root, b"").unwrap();
        Self::with_media_root(media_dir, root)
    }

    fn with_media_root(media_dir: TempDir, root: PathBuf) -> Self {
        let state = ServerState {
            db_client: Arc::new(DbClient::in_memory(
                WorkerId::new_unchecked(0),
                ProcessId::new_unchecked(0),
            )),
            media_store: Arc::new(MediaStore::new(root, "http://localhost:5000/media")),
        };

        Self {
            router: app(state, 1024 * 1024),
            _media_dir: media_dir,
        }
    }

    pub async fn send_raw(&self, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();

        (status, bytes.to_vec())
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let (status, bytes) = self.send_raw(request).await;
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };

        (status, body)
    }

    pub async fn get(&self, path: &str) -> (StatusCode, Value) {
        self.send(Request::get(path).body(Body::empty()).unwrap())
            .await
    }

    pub async fn get_raw(&self, path: &str) -> (StatusCode, Vec<u8>) {
        self.send_raw(Request::get(path).body(Body::empty()).unwrap())
            .await
    }

    pub async fn get_from(&self, path: &str, ip: &str) -> (StatusCode, Value) {
        let request = Request::get(path)
            .header("x-forwarded-for", ip)
            .body(Body::empty())
            .unwrap();
        self.send(request).await
    }

    pub async fn get_from_peer(&self, path: &str, peer: SocketAddr) -> (StatusCode, Value) {
        let mut request = Request::get(path).body(Body::empty()).unwrap();
        request.extensions_mut().insert(ConnectInfo(peer));
        self.send(request).await
    }

    pub async fn post_from(&self, path: &str, ip: &str) -> (StatusCode, Value) {
        let request = Request::post(path)
            .header("x-forwarded-for", ip)
            .body(Body::empty())
            .unwrap();
        self.send(request).await
    }

    pub async fn post_json(&self, path: &str, body: &Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(Method::POST)
            .uri(path)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    pub async fn post_multipart(
        &self,
        path: &str,
        fields: &[(&str, &str)],
        file: Option<(&str, &[u8])>,
    ) -> (StatusCode, Value) {
        let request = Request::post(path)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(multipart_body(fields, file)))
            .unwrap();
        self.send(request).await
    }
}

/// A `multipart/form-data` body with text `fields` and an optional `media` file part.
pub fn multipart_body(fields: &[(&str, &str)], file: Option<(&str, &[u8])>) -> Vec<u8> {
    let mut body = Vec::new();

    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }

    if let Some((file_name, bytes)) = file {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"media\"; \
                filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }

    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}
