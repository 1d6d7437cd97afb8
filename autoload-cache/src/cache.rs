//! On-disk cache of fetched sources
//!
//! Layout under the cache root:
//!
//! ```text
//! manifest.json                 current manifest, replaced by rename
//! blobs/sha256-<hex>.json       one serialized RawFile per source
//! ```
//!
//! Blobs are written before the manifest that names them, so a reader that
//! finds a manifest can always resolve its blobs. Blobs of the previous
//! manifest survive one more cycle for readers that loaded it just before
//! the swap.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::{debug, info, warn};

use autoload::{CachedObjects, RawFile};

use crate::error::{CacheError, Result};

const MANIFEST_FILE: &str = "manifest.json";
const BLOB_DIR: &str = "blobs";

/// One cached source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub name: String,
    /// Content hash naming the blob file
    pub blob: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheManifest {
    pub collections: Vec<CacheEntry>,
    pub environments: Vec<CacheEntry>,
    pub timestamp: DateTime<Utc>,
}

impl CacheManifest {
    fn blobs(&self) -> impl Iterator<Item = &str> {
        self.collections
            .iter()
            .chain(self.environments.iter())
            .map(|entry| entry.blob.as_str())
    }
}

/// Compute the content hash used as a blob name
pub fn compute_hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("sha256-{}", hex::encode(hasher.finalize()))
}

pub struct CacheStore {
    root_dir: PathBuf,
}

impl CacheStore {
    /// Open the cache, discarding any manifest left by a previous process
    pub async fn open(root_dir: impl AsRef<Path>) -> Result<Self> {
        let root_dir = root_dir.as_ref().to_path_buf();
        fs::create_dir_all(root_dir.join(BLOB_DIR)).await?;

        let store = Self { root_dir };
        match fs::remove_file(store.manifest_path()).await {
            Ok(()) => info!(path = %store.root_dir.display(), "Discarded stale manifest"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        info!(path = %store.root_dir.display(), "Opened cache store");
        Ok(store)
    }

    fn manifest_path(&self) -> PathBuf {
        self.root_dir.join(MANIFEST_FILE)
    }

    fn blob_path(&self, hash: &str) -> PathBuf {
        self.root_dir.join(BLOB_DIR).join(format!("{}.json", hash))
    }

    /// Current manifest, if a cycle has completed
    pub async fn manifest(&self) -> Result<Option<CacheManifest>> {
        match fs::read(self.manifest_path()).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn put_blob(&self, file: &RawFile) -> Result<CacheEntry> {
        let data = serde_json::to_vec(file)?;
        let hash = compute_hash(&data);
        let path = self.blob_path(&hash);

        if fs::metadata(&path).await.is_ok() {
            debug!(hash = %hash, name = %file.name, "Blob already exists");
        } else {
            fs::write(&path, &data).await?;
            debug!(hash = %hash, name = %file.name, size = data.len(), "Stored blob");
        }

        Ok(CacheEntry {
            name: file.name.clone(),
            blob: hash,
        })
    }

    /// Persist a full cycle's sources and swap in the new manifest
    pub async fn replace(
        &self,
        collections: &[RawFile],
        environments: &[RawFile],
    ) -> Result<CacheManifest> {
        let mut manifest = CacheManifest {
            collections: Vec::with_capacity(collections.len()),
            environments: Vec::with_capacity(environments.len()),
            timestamp: Utc::now(),
        };
        for file in collections {
            manifest.collections.push(self.put_blob(file).await?);
        }
        for file in environments {
            manifest.environments.push(self.put_blob(file).await?);
        }

        let previous = self.manifest().await.unwrap_or_else(|e| {
            warn!(error = %e, "Previous manifest unreadable");
            None
        });

        let tmp = self.root_dir.join(format!("{}.tmp", MANIFEST_FILE));
        fs::write(&tmp, serde_json::to_vec_pretty(&manifest)?).await?;
        fs::rename(&tmp, self.manifest_path()).await?;

        info!(
            collections = manifest.collections.len(),
            environments = manifest.environments.len(),
            "Manifest written"
        );

        // The new manifest is live; leftover blobs only cost disk space
        if let Err(e) = self.collect_garbage(&manifest, previous.as_ref()).await {
            warn!(error = %e, "Blob cleanup failed");
        }
        Ok(manifest)
    }

    /// Remove blobs named by neither the current nor the previous manifest
    async fn collect_garbage(
        &self,
        current: &CacheManifest,
        previous: Option<&CacheManifest>,
    ) -> Result<usize> {
        let keep: HashSet<&str> = current
            .blobs()
            .chain(previous.into_iter().flat_map(|m| m.blobs()))
            .collect();

        let mut removed = 0;
        let mut entries = fs::read_dir(self.root_dir.join(BLOB_DIR)).await?;
        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name();
            let Some(hash) = file_name.to_str().and_then(|n| n.strip_suffix(".json")) else {
                continue;
            };
            if !keep.contains(hash) {
                fs::remove_file(entry.path()).await?;
                removed += 1;
            }
        }

        if removed > 0 {
            debug!(removed, "Removed unreferenced blobs");
        }
        Ok(removed)
    }

    async fn read_blob(&self, entry: &CacheEntry) -> Result<RawFile> {
        let bytes = fs::read(self.blob_path(&entry.blob)).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CacheError::Corrupt(format!("missing blob {} for {}", entry.blob, entry.name))
            } else {
                CacheError::Io(e)
            }
        })?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Every cached source, or `None` before the first manifest
    pub async fn load_objects(&self) -> Result<Option<CachedObjects>> {
        let Some(manifest) = self.manifest().await? else {
            return Ok(None);
        };

        let mut objects = CachedObjects::default();
        for entry in &manifest.collections {
            objects.collections.push(self.read_blob(entry).await?);
        }
        for entry in &manifest.environments {
            objects.environments.push(self.read_blob(entry).await?);
        }
        Ok(Some(objects))
    }
}
