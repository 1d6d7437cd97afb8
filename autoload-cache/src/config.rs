//! Service configuration

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use url::Url;

use autoload::RetryPolicy;

/// Readiness/cache service arguments
#[derive(Parser, Debug, Clone)]
#[command(name = "autoload-cache")]
#[command(about = "Fetches auto-load sources once per process and serves them to client sessions")]
pub struct Args {
    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8090")]
    pub listen: SocketAddr,

    /// Auto-load config location, a file path or an http(s) URL
    #[arg(long, env = "AUTOLOAD_CONFIG", default_value = "autoload.yaml")]
    pub config: String,

    /// Directory holding the manifest and blobs
    #[arg(long, env = "CACHE_DIR", default_value = "./autoload-cache")]
    pub cache_dir: PathBuf,

    /// Base URL for relative source paths
    #[arg(long, env = "SOURCE_BASE_URL")]
    pub source_base_url: Option<Url>,

    /// Fetch attempts per source
    #[arg(long, env = "FETCH_ATTEMPTS", default_value = "60")]
    pub fetch_attempts: u32,

    /// Delay between fetch attempts in milliseconds
    #[arg(long, env = "FETCH_INTERVAL_MS", default_value = "1000")]
    pub fetch_interval_ms: u64,

    /// Per-request timeout in milliseconds
    #[arg(long, env = "REQUEST_TIMEOUT_MS", default_value = "30000")]
    pub request_timeout_ms: u64,

    /// Emit logs as JSON
    #[arg(long, env = "LOG_JSON", default_value = "false")]
    pub log_json: bool,
}

impl Args {
    pub fn validate(&self) -> Result<(), String> {
        if self.fetch_attempts == 0 {
            return Err("FETCH_ATTEMPTS must be at least 1".to_string());
        }
        if self.config.trim().is_empty() {
            return Err("AUTOLOAD_CONFIG must not be empty".to_string());
        }
        Ok(())
    }

    pub fn service_config(&self) -> ServiceConfig {
        ServiceConfig {
            config_location: self.config.clone(),
            source_base_url: self.source_base_url.clone(),
            fetch_policy: RetryPolicy::new(
                self.fetch_attempts,
                Duration::from_millis(self.fetch_interval_ms),
            ),
            request_timeout: Duration::from_millis(self.request_timeout_ms),
        }
    }
}

/// Settings the readiness service runs with
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub config_location: String,
    pub source_base_url: Option<Url>,
    pub fetch_policy: RetryPolicy,
    pub request_timeout: Duration,
}
