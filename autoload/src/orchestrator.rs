//! Auto-load orchestrator
//!
//! One run per workspace activation:
//!
//! 1. Disabled / existing-data short-circuit, before any I/O
//! 2. Config and source resolution, direct or through the cache service
//! 3. Collection ingestion: normalize, remap, accumulate; embedded
//!    environments are merged and committed per source
//! 4. Environment ingestion, same merge policy
//! 5. One dispatch of the accumulated collection batch
//! 6. A structured [`AutoLoadReport`]
//!
//! Sources are processed strictly in config order, one at a time.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::cache_client::CacheClient;
use crate::config::{AutoLoadConfig, AutoLoadSettings};
use crate::error::{AutoLoadError, Result};
use crate::formats::normalize;
use crate::merge::{apply_policy, MergePolicy};
use crate::reader::FileReader;
use crate::remap::{remap, remap_plugins};
use crate::retry::RetryPolicy;
use crate::store::{Action, Mutation, WorkspaceStore};
use crate::types::{CollectionItem, Environment, ImportSource, Plugin, RawFile};

/// Where config and source contents come from
///
/// Picked once per deployment. Both variants consume the same
/// [`AutoLoadConfig`] shape: directly here, or inside the cache service.
pub enum Topology {
    /// Read the config and every source through an injected reader
    Direct {
        reader: Arc<dyn FileReader>,
        config_source: ImportSource,
    },
    /// Wait for the cache service, then take its cached sources
    Delegated {
        client: CacheClient,
        readiness: RetryPolicy,
    },
}

impl Topology {
    pub fn direct(reader: Arc<dyn FileReader>, config_source: impl Into<String>) -> Self {
        Topology::Direct {
            reader,
            config_source: ImportSource::new(config_source),
        }
    }

    pub fn delegated(client: CacheClient) -> Self {
        Topology::Delegated {
            client,
            readiness: RetryPolicy::READINESS,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Topology::Direct { .. } => "direct",
            Topology::Delegated { .. } => "delegated",
        }
    }
}

/// Terminal outcome of one run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoLoadReport {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Collection sources that normalized successfully
    pub collections_loaded: usize,
    /// Environment entities merged, embedded ones included
    pub environments_loaded: usize,
}

impl AutoLoadReport {
    fn skipped() -> Self {
        Self {
            success: true,
            ..Default::default()
        }
    }
}

/// Raw files for one run, in config order
#[derive(Debug, Default)]
struct ResolvedFiles {
    collections: Vec<RawFile>,
    environments: Vec<RawFile>,
}

#[derive(Debug, Default)]
struct Progress {
    collections_loaded: usize,
    environments_loaded: usize,
}

pub struct AutoLoader {
    settings: AutoLoadSettings,
    topology: Topology,
}

impl AutoLoader {
    pub fn new(settings: AutoLoadSettings, topology: Topology) -> Self {
        Self { settings, topology }
    }

    pub fn settings(&self) -> &AutoLoadSettings {
        &self.settings
    }

    /// Run the pipeline against a workspace
    ///
    /// Never fails: fatal errors are reported in the returned report.
    pub async fn run(&self, store: &dyn WorkspaceStore) -> AutoLoadReport {
        if !self.settings.enabled {
            info!("Auto-load disabled");
            return AutoLoadReport::skipped();
        }
        if self.settings.skip_on_existing_data && store.has_collection_data() {
            info!("Workspace already has collections, skipping auto-load");
            return AutoLoadReport::skipped();
        }

        let mut progress = Progress::default();
        match self.execute(store, &mut progress).await {
            Ok(()) => {
                info!(
                    topology = self.topology.name(),
                    collections = progress.collections_loaded,
                    environments = progress.environments_loaded,
                    "Auto-load complete"
                );
                AutoLoadReport {
                    success: true,
                    error: None,
                    collections_loaded: progress.collections_loaded,
                    environments_loaded: progress.environments_loaded,
                }
            }
            Err(e) => {
                error!(topology = self.topology.name(), error = %e, "Auto-load failed");
                AutoLoadReport {
                    success: false,
                    error: Some(e.to_string()),
                    collections_loaded: 0,
                    environments_loaded: progress.environments_loaded,
                }
            }
        }
    }

    async fn execute(&self, store: &dyn WorkspaceStore, progress: &mut Progress) -> Result<()> {
        let files = self.resolve().await?;
        let policy = MergePolicy::from_merge_flag(self.settings.merge_environments);
        let workspace_id = store.workspace_id();

        let mut items: Vec<CollectionItem> = Vec::new();
        let mut plugins: Vec<Plugin> = Vec::new();

        for file in &files.collections {
            let format = self.settings.format_for(file.format.as_ref());
            let mut import = match normalize(file, &format, &workspace_id) {
                Ok(import) => import,
                Err(e) => {
                    warn!(
                        file = %file.name,
                        format = %format,
                        error = %e,
                        "Skipping collection source"
                    );
                    continue;
                }
            };

            let mapping = remap(&mut import.tree);
            remap_plugins(&mut import.plugins, &mapping);
            info!(
                file = %file.name,
                format = %format,
                nodes = import.node_count(),
                "Loaded collection source"
            );

            if !import.environments.is_empty() {
                progress.environments_loaded += import.environments.len();
                merge_into(store, policy, import.environments);
            }

            items.append(&mut import.tree);
            plugins.append(&mut import.plugins);
            progress.collections_loaded += 1;
        }

        for file in &files.environments {
            match environments_from(file) {
                Ok(environments) => {
                    info!(
                        file = %file.name,
                        count = environments.len(),
                        "Loaded environment source"
                    );
                    progress.environments_loaded += environments.len();
                    merge_into(store, policy, environments);
                }
                Err(e) => warn!(file = %file.name, error = %e, "Skipping environment source"),
            }
        }

        if !items.is_empty() {
            let outcome = store.dispatch(Action::ImportCollections { items, plugins }).await;
            if let Some(message) = outcome.error {
                return Err(AutoLoadError::CommitFailure(message));
            }
        }

        Ok(())
    }

    async fn resolve(&self) -> Result<ResolvedFiles> {
        match &self.topology {
            Topology::Direct { reader, config_source } => {
                let raw = reader
                    .read(config_source)
                    .await
                    .map_err(|e| AutoLoadError::Config(format!("cannot read config: {}", e)))?;
                let config = AutoLoadConfig::from_raw(&raw)?;
                debug!(
                    collections = config.collection_sources.len(),
                    environments = config.environment_sources.len(),
                    "Resolved auto-load config"
                );

                Ok(ResolvedFiles {
                    collections: read_all(reader.as_ref(), &config.collection_sources).await,
                    environments: read_all(reader.as_ref(), &config.environment_sources).await,
                })
            }
            Topology::Delegated { client, readiness } => {
                client.wait_until_ready(*readiness).await?;
                let objects = client.objects().await?.ok_or_else(|| {
                    AutoLoadError::Cache(
                        "service reports initialized but has no cached objects".into(),
                    )
                })?;
                Ok(ResolvedFiles {
                    collections: objects.collections,
                    environments: objects.environments,
                })
            }
        }
    }
}

async fn read_all(reader: &dyn FileReader, sources: &[ImportSource]) -> Vec<RawFile> {
    let mut files = Vec::with_capacity(sources.len());
    for source in sources {
        match reader.read(source).await {
            Ok(file) => files.push(file),
            Err(e) => warn!(source = %source.path, error = %e, "Source unavailable, skipping"),
        }
    }
    files
}

fn merge_into(store: &dyn WorkspaceStore, policy: MergePolicy, incoming: Vec<Environment>) {
    let merged = apply_policy(policy, store.environments(), incoming);
    store.commit(Mutation::SetEnvironments(merged));
}

/// Coerce an environment file into a list; a single object becomes one entry
pub fn environments_from(file: &RawFile) -> Result<Vec<Environment>> {
    let value = file.to_value()?;
    let entries = match value {
        Value::Array(entries) => entries,
        Value::Object(_) => vec![value],
        other => {
            return Err(AutoLoadError::malformed(
                "environment",
                format!("expected object or array, got {}", kind_of(&other)),
            ))
        }
    };

    entries
        .into_iter()
        .map(|entry| {
            serde_json::from_value(entry)
                .map_err(|e| AutoLoadError::malformed("environment", e.to_string()))
        })
        .collect()
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
