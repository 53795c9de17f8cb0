//! Store command - copy a file into the cache

use crate::cache::{ArtifactMetadata, ArtifactRecord, ArtifactStore};
use crate::cli::args::{OutputFormat, StoreArgs};
use crate::cli::commands::{format_size, short_checksum};
use crate::error::CacheResult;
use console::style;

/// Execute the store command
pub async fn execute(args: StoreArgs, store: &ArtifactStore) -> CacheResult<()> {
    let metadata = ArtifactMetadata {
        title: args.title,
        duration_secs: args.duration,
        source_url: args.url,
        ..Default::default()
    };

    let record = store
        .store(&args.key, args.namespace, &args.source, metadata)
        .await?;

    match args.format {
        OutputFormat::Table => print_stored(&record),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&record)?),
        OutputFormat::Plain => println!("{}", record.file_path.display()),
    }

    Ok(())
}

fn print_stored(record: &ArtifactRecord) {
    println!(
        "{} Cached {}/{} ({}, sha256 {})",
        style("✓").green(),
        record.namespace,
        record.key,
        format_size(record.file_size),
        short_checksum(&record.checksum)
    );
    println!("  {}", style(record.file_path.display()).dim());
}
