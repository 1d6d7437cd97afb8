//! Readiness service
//!
//! Runs the fetch-and-cache cycle once at startup and again on each reload
//! command. Client sessions only ever read the resulting cache.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use reqwest::Client;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use url::Url;

use autoload::reader::{fetch_text, resolve_url};
use autoload::{AutoLoadConfig, CachedObjects, ImportSource, RawFile, SourceError};

use crate::cache::{CacheManifest, CacheStore};
use crate::config::ServiceConfig;
use crate::error::{CacheError, Result};

pub struct ReadinessService {
    config: ServiceConfig,
    cache: CacheStore,
    client: Client,
    initialized: AtomicBool,
    /// Serializes cycles so two reloads never interleave their writes
    cycle_lock: Mutex<()>,
}

impl ReadinessService {
    pub fn new(config: ServiceConfig, cache: CacheStore) -> Result<Self> {
        let client = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self {
            config,
            cache,
            client,
            initialized: AtomicBool::new(false),
            cycle_lock: Mutex::new(()),
        })
    }

    /// True once the first cycle has written a manifest
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Cached sources from the latest manifest, `None` before the first cycle
    pub async fn objects(&self) -> Result<Option<CachedObjects>> {
        self.cache.load_objects().await
    }

    /// Kick off the startup cycle without blocking the caller
    pub fn spawn_startup(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let service = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = service.load_cycle().await {
                error!(error = %e, "Startup load failed");
            }
        })
    }

    /// Fetch every configured source and replace the cache
    ///
    /// Sources that never succeed are skipped. Config errors fail the cycle
    /// and leave the previous manifest in place.
    pub async fn load_cycle(&self) -> Result<CacheManifest> {
        let _guard = self.cycle_lock.lock().await;
        info!(config = %self.config.config_location, "Starting load cycle");

        let (config, base) = self.read_config().await?;

        let collections = self.fetch_all(&config.collection_sources, base.as_ref()).await;
        let environments = self.fetch_all(&config.environment_sources, base.as_ref()).await;

        let manifest = self.cache.replace(&collections, &environments).await?;
        self.initialized.store(true, Ordering::SeqCst);

        info!(
            collections = manifest.collections.len(),
            environments = manifest.environments.len(),
            skipped = config.collection_sources.len() + config.environment_sources.len()
                - collections.len()
                - environments.len(),
            "Load cycle complete"
        );
        Ok(manifest)
    }

    /// Read the config and pick the base URL for relative sources
    async fn read_config(&self) -> Result<(AutoLoadConfig, Option<Url>)> {
        let location = &self.config.config_location;

        let (raw, config_url) = match Url::parse(location) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {
                let source = ImportSource::new(location.clone());
                let raw = self
                    .fetch_with_retry(&source, &url)
                    .await
                    .map_err(|e| CacheError::Config(format!("cannot fetch config: {}", e)))?;
                (raw, Some(url))
            }
            _ => {
                let path = Path::new(location);
                let body = tokio::fs::read_to_string(path).await.map_err(|e| {
                    CacheError::Config(format!("cannot read {}: {}", path.display(), e))
                })?;
                let name = ImportSource::new(location.clone()).file_name().to_string();
                (RawFile::from_body(name, body, false), None)
            }
        };

        let config = AutoLoadConfig::from_raw(&raw).map_err(|e| CacheError::Config(e.to_string()))?;
        let base = self.config.source_base_url.clone().or(config_url);
        Ok((config, base))
    }

    async fn fetch_all(&self, sources: &[ImportSource], base: Option<&Url>) -> Vec<RawFile> {
        let mut files = Vec::with_capacity(sources.len());
        for source in sources {
            let url = match locate(source, base) {
                Ok(url) => url,
                Err(e) => {
                    warn!(source = %source.path, error = %e, "Cannot locate source, skipping");
                    continue;
                }
            };
            match self.fetch_with_retry(source, &url).await {
                Ok(file) => files.push(file),
                Err(e) => warn!(
                    source = %source.path,
                    attempts = self.config.fetch_policy.max_attempts,
                    error = %e,
                    "Source never became available, skipping"
                ),
            }
        }
        files
    }

    async fn fetch_with_retry(
        &self,
        source: &ImportSource,
        url: &Url,
    ) -> std::result::Result<RawFile, SourceError> {
        let body = self
            .config
            .fetch_policy
            .run(&source.path, |_| fetch_text(&self.client, url))
            .await?;
        info!(source = %source.path, url = %url, bytes = body.text.len(), "Fetched source");
        Ok(RawFile::from_body(source.file_name(), body.text, body.json)
            .with_format(source.format.clone()))
    }
}

fn locate(source: &ImportSource, base: Option<&Url>) -> std::result::Result<Url, SourceError> {
    match base {
        Some(base) => resolve_url(base, &source.path),
        None => Url::parse(&source.path).map_err(|e| SourceError::InvalidLocation {
            path: source.path.clone(),
            reason: format!("{} (no SOURCE_BASE_URL for relative paths)", e),
        }),
    }
}
