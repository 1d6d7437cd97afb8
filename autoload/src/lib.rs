//! autoload: pre-populate an API-client workspace from external exports
//!
//! Pipeline pieces, leaves first:
//! - [`formats`]: native, Postman v1/v2, Insomnia and OpenAPI/Swagger
//!   documents normalized into one canonical collection tree
//! - [`remap`]: fresh globally unique ids, parent links and plugin targets
//!   rewritten
//! - [`merge`]: keyed environment merging
//! - [`orchestrator`]: config resolution, ingestion and the final commit
//!
//! The readiness/cache service lives in the `autoload-cache` crate and talks
//! to this one through [`cache_client`].

pub mod cache_client;
pub mod config;
pub mod error;
pub mod formats;
pub mod logging;
pub mod merge;
pub mod orchestrator;
pub mod reader;
pub mod remap;
pub mod retry;
pub mod store;
pub mod types;

pub use cache_client::{CacheClient, CachedObjects, ReloadResponse, StatusResponse};
pub use config::{AutoLoadConfig, AutoLoadSettings};
pub use error::{AutoLoadError, Result, SourceError};
pub use formats::{normalize, NormalizedImport};
pub use orchestrator::{AutoLoadReport, AutoLoader, Topology};
pub use reader::{FileReader, FsReader, HttpReader};
pub use retry::RetryPolicy;
pub use store::{InMemoryWorkspace, WorkspaceStore};
pub use types::{
    CollectionItem, Environment, FileKind, ImportFormat, ImportSource, ItemKind, Plugin, RawFile,
};
