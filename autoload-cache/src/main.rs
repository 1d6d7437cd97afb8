//! autoload-cache: fetch auto-load sources once, serve them to every session

use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use autoload::logging;
use autoload_cache::{create_router, Args, CacheStore, ReadinessService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    logging::init("autoload_cache=info,autoload=info", args.log_json);

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!(
        listen = %args.listen,
        config = %args.config,
        cache_dir = %args.cache_dir.display(),
        "Starting autoload-cache"
    );

    let cache = CacheStore::open(&args.cache_dir).await?;
    let service = Arc::new(ReadinessService::new(args.service_config(), cache)?);

    // Sessions arriving before this finishes see `initialized: false`
    service.spawn_startup();

    let listener = tokio::net::TcpListener::bind(args.listen).await?;
    info!(addr = %args.listen, "Listening");
    axum::serve(listener, create_router(service)).await?;

    Ok(())
}
