//! autoload-cache: readiness and cache service for the delegated topology
//!
//! Fetches every source listed in the auto-load config once per process,
//! persists them, and serves them to any number of client sessions.
//! Consumers poll [`routes::status`] then read [`routes::objects`].

pub mod cache;
pub mod config;
pub mod error;
pub mod routes;
pub mod service;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

pub use cache::{CacheManifest, CacheStore};
pub use config::{Args, ServiceConfig};
pub use error::CacheError;
pub use service::ReadinessService;

pub type SharedService = Arc<ReadinessService>;

/// Create the service router
pub fn create_router(service: SharedService) -> Router {
    Router::new()
        .route("/health", get(routes::health))
        .route("/status", get(routes::status))
        .route("/objects", get(routes::objects))
        .route("/reload", post(routes::reload))
        .with_state(service)
}
