//! HTTP routes
//!
//! - `GET /status`: `{initialized}`
//! - `GET /objects`: every cached source, 404 until the first cycle completes
//! - `POST /reload`: rerun the full cycle, 500 on failure
//! - `GET /health`: liveness

use axum::{extract::State, response::IntoResponse, Json};
use tracing::info;

use autoload::{CachedObjects, ReloadResponse, StatusResponse};

use crate::error::{CacheError, Result};
use crate::SharedService;

/// Health check endpoint
pub async fn health() -> impl IntoResponse {
    "OK"
}

/// GET /status
pub async fn status(State(service): State<SharedService>) -> Json<StatusResponse> {
    Json(StatusResponse {
        initialized: service.is_initialized(),
    })
}

/// GET /objects
pub async fn objects(State(service): State<SharedService>) -> Result<Json<CachedObjects>> {
    service.objects().await?.map(Json).ok_or(CacheError::NotCached)
}

/// POST /reload
pub async fn reload(State(service): State<SharedService>) -> Result<Json<ReloadResponse>> {
    info!("Reload requested");
    service.load_cycle().await?;
    Ok(Json(ReloadResponse {
        success: true,
        error: None,
    }))
}
