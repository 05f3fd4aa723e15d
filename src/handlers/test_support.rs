use axum::{body::Body, response::Response, Router};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tempfile::TempDir;

use crate::config::Config;
use crate::db::Database;
use crate::storage::LocalStorage;
use crate::AppState;

/// Router over a throwaway database and upload directory inside a temp dir
pub async fn test_app(mut config: Config) -> (TempDir, AppState, Router) {
    let dir = tempfile::tempdir().unwrap();
    config.database.path = dir.path().join("documents.db").to_string_lossy().into_owned();
    config.storage.upload_dir = dir.path().join("uploads").to_string_lossy().into_owned();
    std::fs::create_dir_all(&config.storage.upload_dir).unwrap();

    let db = Database::new(&config.database).await.unwrap();
    db.run_migrations().await.unwrap();

    let state = AppState {
        db,
        storage: Arc::new(LocalStorage::new(&config.storage.upload_dir)),
        config: Arc::new(config),
    };
    let app = crate::create_router(state.clone());
    (dir, state, app)
}

pub async fn body_bytes(response: Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

pub async fn body_json<T: DeserializeOwned>(response: Response) -> T {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

const BOUNDARY: &str = "docshelf-test-boundary";

/// Hand-rolled multipart/form-data body
#[derive(Default)]
pub struct MultipartBuilder {
    body: Vec<u8>,
}

impl MultipartBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn file(
        mut self,
        field: &str,
        filename: &str,
        content_type: Option<&str>,
        data: &[u8],
    ) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                BOUNDARY, field, filename
            )
            .as_bytes(),
        );
        if let Some(content_type) = content_type {
            self.body
                .extend_from_slice(format!("Content-Type: {}\r\n", content_type).as_bytes());
        }
        self.body.extend_from_slice(b"\r\n");
        self.body.extend_from_slice(data);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    pub fn text(mut self, field: &str, value: &str) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                BOUNDARY, field, value
            )
            .as_bytes(),
        );
        self
    }

    /// Content-Type header value and body bytes
    pub fn finish(mut self) -> (String, Vec<u8>) {
        self.body
            .extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
        (
            format!("multipart/form-data; boundary={}", BOUNDARY),
            self.body,
        )
    }
}
