//! Gc command - remove old cached files

use crate::cache::ArtifactStore;
use crate::cli::args::GcArgs;
use crate::cli::commands::format_size;
use crate::config::Config;
use crate::error::CacheResult;
use console::style;
use std::time::Duration;

const DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Execute the gc command
pub async fn execute(args: GcArgs, store: &ArtifactStore, config: &Config) -> CacheResult<()> {
    let gc_days = args.days.unwrap_or(config.cache.gc_days);

    if gc_days == 0 {
        println!("Cache GC is disabled (gc_days = 0)");
        return Ok(());
    }

    let stats = store.cleanup(DAY * gc_days, args.dry_run).await;

    if stats.files_removed == 0 && stats.errors == 0 {
        println!("No cached files older than {} days.", gc_days);
        return Ok(());
    }

    if args.dry_run {
        println!(
            "Would remove {} file(s), {} (dry run)",
            stats.files_removed,
            format_size(stats.bytes_freed)
        );
    } else {
        println!(
            "{} removed {} file(s), {} freed",
            style("✓").green(),
            stats.files_removed,
            format_size(stats.bytes_freed)
        );
    }

    if stats.errors > 0 {
        println!(
            "{} {} file(s) could not be removed",
            style("!").yellow(),
            stats.errors
        );
    }

    Ok(())
}
