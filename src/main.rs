//! dvdcache - artifact cache for DVD media pipelines
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use dvdcache::cache::{ArtifactStore, Namespace};
use dvdcache::cli::{Cli, Commands};
use dvdcache::config::ConfigManager;
use dvdcache::error::CacheResult;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> CacheResult<()> {
    let cli = Cli::parse();

    let config_manager = if let Some(ref path) = cli.config {
        ConfigManager::with_path(path.clone())
    } else {
        ConfigManager::new()
    };

    // Config command must work even when the file is invalid
    if let Commands::Config(args) = cli.command {
        init_logging(cli.verbose, false);
        return dvdcache::cli::commands::config(args, &config_manager).await;
    }

    let config = config_manager.load().await?;
    init_logging(cli.verbose, config.general.log_format == "json");

    let root = ConfigManager::resolve_cache_root(&config, cli.cache_dir.as_deref());
    debug!("Using cache root {}", root.display());
    let mut options = config.store_options();
    if cli.force_download {
        options = options.force(Namespace::Downloads);
    }
    if cli.force_convert {
        options = options.force(Namespace::Converted);
    }
    let store = ArtifactStore::open(root, options).await?;

    // Dispatch to command
    match cli.command {
        Commands::Config(_) => unreachable!("Config handled above"),
        Commands::Store(args) => dvdcache::cli::commands::store(args, &store).await,
        Commands::Get(args) => dvdcache::cli::commands::get(args, &store).await,
        Commands::Check(args) => dvdcache::cli::commands::check(args, &store).await,
        Commands::Stats(args) => dvdcache::cli::commands::stats(args, &store).await,
        Commands::Gc(args) => dvdcache::cli::commands::gc(args, &store, &config).await,
        Commands::Clear(args) => dvdcache::cli::commands::clear(args, &store).await,
        Commands::Fit(args) => dvdcache::cli::commands::fit(args, &store, &config).await,
    }
}

/// Logging: 0 = warn, 1 = info, 2+ = debug; always on stderr
fn init_logging(verbose: u8, json: bool) {
    let filter = match verbose {
        0 => EnvFilter::new("dvdcache=warn"),
        1 => EnvFilter::new("dvdcache=info"),
        _ => EnvFilter::new("dvdcache=debug"),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    if json {
        builder.json().init();
    } else {
        builder.without_time().init();
    }
}
