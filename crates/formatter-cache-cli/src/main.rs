//! Formatter Cache CLI - operator tool for warming and maintaining the cache.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use formatter_cache_core::{
    AppConfig, FormatRequest, FormatResponse, FormatService, FormatType, FormatterCache,
    clear_formatter_cache, util::formatter_cache_path,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use tracing::{Level, info, warn};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "formatter-cache")]
#[command(author, version, about = "Warm and maintain the metadata formatter cache", long_about = None)]
struct Args {
    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Catalog API base URL
    #[arg(long, env = "CATALOG_API_BASE", global = true)]
    api_base: Option<String>,

    /// Catalog API key
    #[arg(long, env = "CATALOG_API_KEY", global = true)]
    api_key: Option<String>,

    /// Verbose output
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render records into the cache
    Warm {
        /// Record ids (e.g., "1-10" or "1,3,5")
        #[arg(long, required = true)]
        ids: String,

        /// Output language
        #[arg(short, long, default_value = "eng")]
        lang: String,

        /// Output format type
        #[arg(short = 't', long = "type", default_value = "html")]
        format_type: FormatType,

        /// Formatter id (defaults to the catalog's default formatter)
        #[arg(long)]
        xsl: Option<String>,

        /// Only render the variant with withheld elements hidden
        #[arg(long)]
        public_only: bool,
    },
    /// Delete every entry in the disk cache
    Clear,
    /// Print entry counts and sizes
    Stats,
}

fn parse_id_range(ids: &str) -> Result<Vec<u64>> {
    let mut result = Vec::new();

    for part in ids.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        if let Some((start, end)) = part.split_once('-') {
            let start: u64 = start.trim().parse().context("Invalid id range start")?;
            let end: u64 = end.trim().parse().context("Invalid id range end")?;
            if start > end {
                anyhow::bail!("Invalid id range {part}: start is after end");
            }
            result.extend(start..=end);
        } else {
            result.push(part.parse().context("Invalid record id")?);
        }
    }

    result.sort_unstable();
    result.dedup();
    Ok(result)
}

fn load_config(args: &Args) -> Result<AppConfig> {
    let mut config = if let Some(config_path) = &args.config {
        AppConfig::from_file(config_path).context("Failed to load config file")?
    } else {
        AppConfig::load()
    };

    // Override config with CLI arguments
    if let Some(ref api_base) = args.api_base {
        config.catalog.api_base.clone_from(api_base);
    }
    if args.api_key.is_some() {
        config.catalog.api_key.clone_from(&args.api_key);
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

async fn warm(
    config: &AppConfig,
    ids: &str,
    lang: &str,
    format_type: FormatType,
    xsl: Option<&str>,
    public_only: bool,
) -> Result<()> {
    let ids = parse_id_range(ids)?;
    if ids.is_empty() {
        anyhow::bail!("No record ids to warm");
    }

    let service = FormatService::new(config).context("Failed to initialize format service")?;
    info!("Warming {} records through {}", ids.len(), service.renderer_info().name);

    // Setup progress bar
    #[allow(clippy::cast_possible_truncation)]
    let pb = ProgressBar::new(ids.len() as u64);
    // Template is hardcoded and valid, unwrap is safe
    #[allow(clippy::unwrap_used)]
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
            .unwrap()
            .progress_chars("#>-"),
    );

    let mut failed = 0usize;
    for &id in &ids {
        pb.set_message(format!("Record {id}"));

        let mut request = FormatRequest::new(lang, format_type)
            .param("id", id.to_string())
            .param("skipPopularity", "true");
        if let Some(xsl) = xsl {
            request = request.param("xsl", xsl);
        }
        if public_only {
            request = request.param("hide_withheld", "true");
        }

        match service.format(request).await {
            Ok(FormatResponse::Rendered { bytes, .. }) => {
                info!("Record {} rendered ({} bytes)", id, bytes.len());
            }
            Ok(FormatResponse::NotModified { .. }) => {}
            Err(e) => {
                failed += 1;
                pb.println(format!("Record {id}: {e}"));
            }
        }
        pb.inc(1);
    }

    pb.set_message("waiting for public variants");
    service.cache().wait_for_derivations().await;
    pb.finish_with_message("Warm-up complete");

    if failed > 0 {
        warn!("{} of {} records failed", failed, ids.len());
    }

    // CLI output is intentional
    #[allow(clippy::print_stdout)]
    {
        println!("Warmed {} records ({} failed)", ids.len() - failed, failed);
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (before parsing args so env vars are available)
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Setup logging
    let log_level = match args.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    let config = load_config(&args)?;

    match args.command {
        Command::Warm {
            ref ids,
            ref lang,
            format_type,
            ref xsl,
            public_only,
        } => warm(&config, ids, lang, format_type, xsl.as_deref(), public_only).await,
        Command::Clear => {
            let path = config
                .cache
                .disk_path
                .clone()
                .unwrap_or_else(formatter_cache_path);
            let count = clear_formatter_cache(&path)
                .map_err(anyhow::Error::msg)
                .context("Failed to clear disk cache")?;

            // CLI output is intentional
            #[allow(clippy::print_stdout)]
            {
                println!("Cleared {count} entries from {}", path.display());
            }
            Ok(())
        }
        Command::Stats => {
            let cache = FormatterCache::new(&config.cache).context("Failed to open cache")?;
            let stats = serde_json::to_string_pretty(&cache.stats().await)?;

            // CLI output is intentional
            #[allow(clippy::print_stdout)]
            {
                println!("{stats}");
            }
            Ok(())
        }
    }
}
