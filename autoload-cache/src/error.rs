//! Error types for the cache service

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use autoload::ReloadResponse;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Nothing cached yet")]
    NotCached,

    #[error("Cache entry corrupt: {0}")]
    Corrupt(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

impl CacheError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotCached => StatusCode::NOT_FOUND,
            Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Corrupt(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Http(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

/// Failures render as `{success: false, error}` with the mapped status
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let body = ReloadResponse {
            success: false,
            error: Some(self.to_string()),
        };
        (self.status_code(), Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, CacheError>;
