//! File reader capability
//!
//! The orchestrator never touches the filesystem or network directly. It is
//! handed a [`FileReader`] chosen by the host at startup: [`FsReader`] in a
//! desktop process, [`HttpReader`] in a browser-hosted session.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use tracing::debug;
use url::Url;

use crate::error::SourceError;
use crate::types::{ImportSource, RawFile};

/// Reads the contents of one import source
#[async_trait]
pub trait FileReader: Send + Sync {
    async fn read(&self, source: &ImportSource) -> Result<RawFile, SourceError>;
}

// ============================================================================
// Filesystem
// ============================================================================

/// Reads sources from the local filesystem, relative paths against `base_dir`
#[derive(Debug, Clone)]
pub struct FsReader {
    base_dir: PathBuf,
}

impl FsReader {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }
}

#[async_trait]
impl FileReader for FsReader {
    async fn read(&self, source: &ImportSource) -> Result<RawFile, SourceError> {
        let path = self.resolve(&source.path);
        let body = tokio::fs::read_to_string(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                SourceError::NotFound(path.display().to_string())
            } else {
                SourceError::Unreadable {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                }
            }
        })?;

        debug!(path = %path.display(), bytes = body.len(), "Read source from disk");
        Ok(RawFile::from_body(source.file_name(), body, false).with_format(source.format.clone()))
    }
}

// ============================================================================
// HTTP
// ============================================================================

/// Fetches sources over HTTP, relative paths against `base_url`
#[derive(Debug, Clone)]
pub struct HttpReader {
    client: Client,
    base_url: Url,
}

impl HttpReader {
    pub fn new(base_url: Url, timeout: Duration) -> Result<Self, SourceError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SourceError::Unreadable {
                path: base_url.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self { client, base_url })
    }

    /// Absolute URLs are used as-is, anything else is joined to the base
    pub fn resolve(&self, path: &str) -> Result<Url, SourceError> {
        resolve_url(&self.base_url, path)
    }
}

/// Resolve a source path against a base URL
pub fn resolve_url(base: &Url, path: &str) -> Result<Url, SourceError> {
    if let Ok(url) = Url::parse(path) {
        return Ok(url);
    }
    base.join(path).map_err(|e| SourceError::InvalidLocation {
        path: path.to_string(),
        reason: e.to_string(),
    })
}

#[async_trait]
impl FileReader for HttpReader {
    async fn read(&self, source: &ImportSource) -> Result<RawFile, SourceError> {
        let url = self.resolve(&source.path)?;
        let body = fetch_text(&self.client, &url).await?;
        Ok(RawFile::from_body(source.file_name(), body.text, body.json)
            .with_format(source.format.clone()))
    }
}

/// Response body plus whether the server labelled it JSON
pub struct FetchedBody {
    pub text: String,
    pub json: bool,
}

/// GET one URL, mapping 404 to `NotFound` and other failures to `Unreadable`
pub async fn fetch_text(client: &Client, url: &Url) -> Result<FetchedBody, SourceError> {
    let response = client.get(url.clone()).send().await?;

    if response.status() == StatusCode::NOT_FOUND {
        return Err(SourceError::NotFound(url.to_string()));
    }
    if !response.status().is_success() {
        return Err(SourceError::Unreadable {
            path: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let json = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.contains("json"));
    let text = response.text().await?;

    debug!(url = %url, bytes = text.len(), json, "Fetched source");
    Ok(FetchedBody { text, json })
}
