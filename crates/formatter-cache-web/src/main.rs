//! Formatter Cache Web - HTTP front end serving cached metadata formatter output.

mod helpers;
mod routes;
mod state;

use anyhow::{Context, Result};
use clap::Parser;
use formatter_cache_core::{AppConfig, clear_formatter_cache, util::formatter_cache_path};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use state::AppState;

#[derive(Parser, Debug)]
#[command(name = "formatter-cache-web")]
#[command(author, version, about = "Metadata Formatter Cache Server", long_about = None)]
struct Args {
    /// Host to bind to
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to bind to
    #[arg(short, long, default_value = "3000")]
    port: u16,

    /// Config file path (defaults to ~/.config/formatter-cache/config.toml or ./config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Catalog API base URL
    #[arg(long, env = "CATALOG_API_BASE")]
    api_base: Option<String>,

    /// Catalog API key
    #[arg(long, env = "CATALOG_API_KEY")]
    api_key: Option<String>,

    /// Verbose output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Clear the disk cache on startup
    #[arg(long)]
    clear_cache: bool,
}

/// Load configuration and apply command line overrides
fn load_config(args: &Args) -> Result<AppConfig> {
    let mut config = match args.config {
        Some(ref path) => AppConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => AppConfig::load(),
    };

    if let Some(ref api_base) = args.api_base {
        config.catalog.api_base.clone_from(api_base);
    }
    if args.api_key.is_some() {
        config.catalog.api_key.clone_from(&args.api_key);
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (before parsing args so env vars are available)
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let default_level = match args.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{default_level},sled=warn")));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();

    let config = load_config(&args)?;

    // Clear before the cache opens the database
    if args.clear_cache {
        let path = config
            .cache
            .disk_path
            .clone()
            .unwrap_or_else(formatter_cache_path);
        match clear_formatter_cache(&path) {
            Ok(count) => info!("Cleared {} cached entries", count),
            Err(e) => warn!("Failed to clear cache: {}", e),
        }
    }

    // Opens the disk tier - fails fast if locked
    let state = Arc::new(
        AppState::new(&config).context("Failed to initialize application state")?,
    );
    info!(
        "Rendering through {} at {}",
        state.service.renderer_info().name,
        config.catalog.api_base
    );

    let app = routes::router(state);

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
