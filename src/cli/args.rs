//! CLI argument definitions using clap derive

use crate::cache::Namespace;
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// dvdcache - artifact cache for DVD media pipelines
///
/// Stores downloaded and converted videos under a shared cache directory
/// that concurrent pipeline processes can safely read and write, and plans
/// which cached videos fit on a disc.
#[derive(Parser, Debug)]
#[command(name = "dvdcache")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "DVDCACHE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Cache root directory (overrides cache.root)
    #[arg(long, global = true, env = "DVDCACHE_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Treat cached downloads as missing
    #[arg(long, global = true)]
    pub force_download: bool,

    /// Treat cached conversions as missing
    #[arg(long, global = true)]
    pub force_convert: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Copy a file into the cache
    Store(StoreArgs),

    /// Show a verified cache entry
    Get(GetArgs),

    /// Exit successfully if an entry is cached
    Check(CheckArgs),

    /// Show cache usage per directory
    Stats(StatsArgs),

    /// Remove cached files older than N days
    Gc(GcArgs),

    /// Remove every entry of one namespace
    Clear(ClearArgs),

    /// Select cached conversions that fit on a disc
    Fit(FitArgs),

    /// Show or edit configuration
    Config(ConfigArgs),
}

/// Arguments for the store command
#[derive(Parser, Debug)]
pub struct StoreArgs {
    /// Cache key (video id)
    pub key: String,

    /// File to copy into the cache
    pub source: PathBuf,

    /// Namespace to store into
    #[arg(short, long, default_value = "downloads")]
    pub namespace: Namespace,

    /// Video title
    #[arg(long)]
    pub title: Option<String>,

    /// Duration in seconds
    #[arg(long)]
    pub duration: Option<u64>,

    /// Original URL of the video
    #[arg(long)]
    pub url: Option<String>,

    /// Output format
    #[arg(short, long, default_value = "table")]
    pub format: OutputFormat,
}

/// Arguments for the get command
#[derive(Parser, Debug)]
pub struct GetArgs {
    /// Cache key (video id)
    pub key: String,

    /// Namespace to read from
    #[arg(short, long, default_value = "downloads")]
    pub namespace: Namespace,

    /// Output format
    #[arg(short, long, default_value = "table")]
    pub format: OutputFormat,
}

/// Arguments for the check command
#[derive(Parser, Debug)]
pub struct CheckArgs {
    /// Cache key (video id)
    pub key: String,

    /// Namespace to check
    #[arg(short, long, default_value = "downloads")]
    pub namespace: Namespace,

    /// Print nothing, report through the exit status only
    #[arg(short, long)]
    pub quiet: bool,
}

/// Arguments for the stats command
#[derive(Parser, Debug)]
pub struct StatsArgs {
    /// Output format
    #[arg(short, long, default_value = "table")]
    pub format: OutputFormat,
}

/// Arguments for the gc command
#[derive(Parser, Debug)]
pub struct GcArgs {
    /// Remove files older than N days (default: from config)
    #[arg(long)]
    pub days: Option<u32>,

    /// Show what would be removed without removing
    #[arg(long)]
    pub dry_run: bool,
}

/// Arguments for the clear command
#[derive(Parser, Debug)]
pub struct ClearArgs {
    /// Namespace to clear
    pub namespace: Namespace,

    /// Show what would be removed without removing
    #[arg(long)]
    pub dry_run: bool,

    /// Skip confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

/// Arguments for the fit command
#[derive(Parser, Debug)]
pub struct FitArgs {
    /// Keys in disc order
    #[arg(required = true)]
    pub keys: Vec<String>,

    /// Budget in GiB (default: from config)
    #[arg(long, conflicts_with = "dual_layer")]
    pub budget_gib: Option<f64>,

    /// Use the 8.5 GiB dual-layer budget
    #[arg(long)]
    pub dual_layer: bool,

    /// Output format
    #[arg(short, long, default_value = "table")]
    pub format: OutputFormat,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Subcommand for config
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Initialize default configuration
    Init {
        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },
}

/// Output format for commands that print entries
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table
    Table,
    /// JSON output
    Json,
    /// Paths only, one per line
    Plain,
}
