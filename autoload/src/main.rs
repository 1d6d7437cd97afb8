//! autoload: run one auto-load pass against a fresh in-memory workspace
//!
//! Reader selection:
//! - `--cache-url`: delegated to a running `autoload-cache` service
//! - `--base-url`: config and sources fetched over HTTP
//! - otherwise: config and sources read from disk, relative to the config

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use url::Url;

use autoload::{
    logging, AutoLoadSettings, AutoLoader, CacheClient, FsReader, HttpReader, ImportFormat,
    InMemoryWorkspace, Topology,
};

#[derive(Parser)]
#[command(name = "autoload")]
#[command(about = "Load collections and environments into a workspace from external exports")]
struct Cli {
    /// Auto-load config (YAML or JSON), a path or a path relative to --base-url
    #[arg(short, long, env = "AUTOLOAD_CONFIG", default_value = "autoload.yaml")]
    config: String,

    /// Fetch config and sources over HTTP from this base URL
    #[arg(long, env = "AUTOLOAD_BASE_URL", conflicts_with = "cache_url")]
    base_url: Option<Url>,

    /// Take sources from a readiness/cache service instead of reading them
    #[arg(long, env = "AUTOLOAD_CACHE_URL")]
    cache_url: Option<Url>,

    /// Orchestrator switches (TOML)
    #[arg(short, long, default_value = "autoload.toml")]
    settings: PathBuf,

    /// Workspace id stamped on imported nodes
    #[arg(long, default_value = "default")]
    workspace_id: String,

    /// Format for sources without an explicit one (overrides settings)
    #[arg(long)]
    default_import_type: Option<ImportFormat>,

    /// Replace environments instead of merging by name (overrides settings)
    #[arg(long)]
    replace_environments: bool,

    /// HTTP timeout in seconds
    #[arg(long, default_value = "30")]
    timeout_secs: u64,

    /// Write the resulting workspace snapshot as JSON
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init("autoload=info", cli.log_json);

    let mut settings = AutoLoadSettings::load(&cli.settings)?;
    if let Some(format) = cli.default_import_type.clone() {
        settings.default_import_type = format;
    }
    if cli.replace_environments {
        settings.merge_environments = false;
    }
    info!(
        default_import_type = %settings.default_import_type,
        merge_environments = settings.merge_environments,
        "Settings loaded"
    );

    let timeout = Duration::from_secs(cli.timeout_secs);
    let topology = if let Some(cache_url) = cli.cache_url.clone() {
        info!(url = %cache_url, "Using cache service");
        Topology::delegated(CacheClient::new(cache_url, timeout)?)
    } else if let Some(base_url) = cli.base_url.clone() {
        info!(url = %base_url, config = %cli.config, "Reading sources over HTTP");
        Topology::direct(Arc::new(HttpReader::new(base_url, timeout)?), cli.config.clone())
    } else {
        let (base_dir, file) = split_config_path(Path::new(&cli.config))?;
        info!(dir = %base_dir.display(), config = %file, "Reading sources from disk");
        Topology::direct(Arc::new(FsReader::new(base_dir)), file)
    };

    let workspace = InMemoryWorkspace::new(cli.workspace_id.clone());
    let report = AutoLoader::new(settings, topology).run(&workspace).await;

    println!("{}", serde_json::to_string_pretty(&report)?);

    if let Some(out) = &cli.out {
        let snapshot = serde_json::to_string_pretty(&workspace.snapshot())?;
        std::fs::write(out, snapshot).with_context(|| format!("writing {}", out.display()))?;
        info!(path = %out.display(), "Workspace snapshot written");
    }

    if !report.success {
        std::process::exit(1);
    }
    Ok(())
}

/// Sources in the config are relative to the config's own directory
fn split_config_path(path: &Path) -> anyhow::Result<(PathBuf, String)> {
    let file = path
        .file_name()
        .and_then(|f| f.to_str())
        .with_context(|| format!("invalid config path {}", path.display()))?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    Ok((dir, file.to_string()))
}
