//! Zipline command-line tool.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use zipline_cache::{ContentCache, SystemClock};
use zipline_core::{CacheConfig, LoaderConfig};
use zipline_loader::{Downloader, ReqwestClient, TracingEventListener};

#[derive(Parser)]
#[command(name = "ziplinectl")]
#[command(about = "Zipline module delivery tool")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Materialize a manifest and all of its modules to a directory
    Download(DownloadArgs),
}

#[derive(Args)]
struct DownloadArgs {
    /// Manifest URL
    #[arg(long, env = "ZIPLINE_MANIFEST_URL")]
    manifest_url: String,

    /// Output directory
    #[arg(long)]
    dir: PathBuf,

    /// Application name used in events and logs
    #[arg(long, default_value = "zipline")]
    application_name: String,

    /// Optional TOML config file
    #[arg(long, env = "ZIPLINE_CONFIG")]
    config: Option<PathBuf>,

    /// Cache directory (overrides config file)
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Maximum concurrent downloads (overrides config file)
    #[arg(long)]
    concurrent_downloads: Option<usize>,
}

/// Config-file/env settings; CLI flags take precedence.
#[derive(Debug, Default, Deserialize)]
struct ToolConfig {
    cache_dir: Option<PathBuf>,
    max_cache_size_bytes: Option<u64>,
    embedded_dir: Option<PathBuf>,
    concurrent_downloads: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Download(args) => download(args).await,
    }
}

async fn download(args: DownloadArgs) -> Result<()> {
    let mut figment = Figment::new();
    if let Some(path) = &args.config {
        figment = figment.merge(Toml::file(path));
    }
    let file_config: ToolConfig = figment
        .merge(Env::prefixed("ZIPLINE_"))
        .extract()
        .context("invalid configuration")?;

    let cache_dir = args
        .cache_dir
        .or(file_config.cache_dir)
        .unwrap_or_else(|| std::env::temp_dir().join("zipline-cache"));
    let mut cache_config = CacheConfig::new(cache_dir);
    if let Some(max) = file_config.max_cache_size_bytes {
        cache_config.max_size_bytes = max;
    }

    let mut loader_config = LoaderConfig::new(args.application_name);
    loader_config.embedded_dir = file_config.embedded_dir;
    if let Some(n) = args.concurrent_downloads.or(file_config.concurrent_downloads) {
        loader_config.concurrent_downloads = n;
    }

    let cache = ContentCache::open(&cache_config, Arc::new(SystemClock))
        .await
        .context("failed to open content cache")?;
    let downloader = Downloader::new(
        loader_config,
        Arc::new(ReqwestClient::new()),
        Arc::new(cache),
        Arc::new(TracingEventListener),
    )
    .context("failed to build downloader")?;

    let manifest = downloader
        .download(&args.dir, &args.manifest_url)
        .await
        .with_context(|| format!("failed to download {}", args.manifest_url))?;

    println!(
        "downloaded {} modules to {}",
        manifest.modules().len(),
        args.dir.display()
    );
    Ok(())
}
