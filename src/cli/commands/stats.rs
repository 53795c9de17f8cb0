//! Stats command - show cache usage

use crate::cache::{ArtifactStore, CacheStats};
use crate::cli::args::{OutputFormat, StatsArgs};
use crate::cli::commands::format_size;
use crate::error::CacheResult;

/// Execute the stats command
pub async fn execute(args: StatsArgs, store: &ArtifactStore) -> CacheResult<()> {
    let stats = store.stats().await;

    match args.format {
        OutputFormat::Table => print_stats_table(&stats),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&stats)?),
        OutputFormat::Plain => {
            for dir in &stats.dirs {
                println!("{} {} {}", dir.name, dir.files, dir.bytes);
            }
        }
    }

    Ok(())
}

fn print_stats_table(stats: &CacheStats) {
    println!("Cache: {}", stats.root.display());
    println!();
    println!("{:<12} {:>8} {:>12}", "DIRECTORY", "FILES", "SIZE");
    println!("{}", "-".repeat(34));

    for dir in &stats.dirs {
        println!(
            "{:<12} {:>8} {:>12}",
            dir.name,
            dir.files,
            format_size(dir.bytes)
        );
    }

    println!();
    println!(
        "Total: {} file(s), {}",
        stats.total_files,
        format_size(stats.total_bytes)
    );
}
