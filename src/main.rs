//! Mines Casino API server binary

use clap::Parser;
use mines_casino::{
    api::{ApiKeyAuthenticator, ApiServer, AppState},
    build_service, open_store, ConfigLoader, StorageBackend,
};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "mines-casino")]
#[command(about = "Server-authoritative Mines game API", long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Override server.host
    #[arg(long)]
    host: Option<String>,

    /// Override server.port
    #[arg(long)]
    port: Option<u16>,

    /// Override storage.data_directory
    #[arg(long)]
    data_dir: Option<String>,

    /// Keep everything in memory (nothing survives a restart)
    #[arg(long)]
    memory: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mines_casino=info,tower_http=info".into()),
        )
        .init();

    let args = Args::parse();

    let loader = match args.config {
        Some(ref path) => ConfigLoader::new().with_path(path),
        None => ConfigLoader::new(),
    };
    let mut config = loader.load()?;

    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(dir) = args.data_dir {
        config.storage.data_directory = dir;
    }
    if args.memory {
        config.storage.backend = StorageBackend::Memory;
    }
    config.validate()?;

    match config.storage.backend {
        StorageBackend::Memory => warn!("Using in-memory storage, balances are lost on restart"),
        StorageBackend::RocksDb => info!("Opening database: {}", config.storage.data_directory),
    }
    let store = open_store(&config)?;
    let service = Arc::new(build_service(&config, store)?);

    let authenticator = ApiKeyAuthenticator::from_config(&config.auth);
    if authenticator.is_empty() {
        warn!("No API keys configured, every game endpoint will answer 401");
    } else {
        info!("Loaded {} API keys", authenticator.len());
    }

    let state = Arc::new(AppState::new(service, Arc::new(authenticator)));
    ApiServer::new(config.server.clone(), state).run().await?;
    Ok(())
}
