//! Get command - show a verified cache entry

use crate::cache::{ArtifactRecord, ArtifactStore};
use crate::cli::args::{GetArgs, OutputFormat};
use crate::cli::commands::format_size;
use crate::error::{CacheError, CacheResult};
use console::style;

/// Execute the get command
pub async fn execute(args: GetArgs, store: &ArtifactStore) -> CacheResult<()> {
    let record = store
        .retrieve(&args.key, args.namespace)
        .await
        .ok_or_else(|| {
            CacheError::User(format!("{}/{} is not cached", args.namespace, args.key))
        })?;

    match args.format {
        OutputFormat::Table => print_record(&record),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&record)?),
        OutputFormat::Plain => println!("{}", record.file_path.display()),
    }

    Ok(())
}

fn print_record(record: &ArtifactRecord) {
    let row = |label: &str, value: String| println!("{:<10} {}", style(label).bold(), value);

    row("Key", record.key.clone());
    row("Namespace", record.namespace.to_string());
    row("Path", record.file_path.display().to_string());
    row(
        "Size",
        format!("{} ({} bytes)", format_size(record.file_size), record.file_size),
    );
    row("Format", record.format.clone());
    row("SHA-256", record.checksum.clone());
    row(
        "Cached",
        record.cached_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    );
    if let Some(title) = &record.metadata.title {
        row("Title", title.clone());
    }
    if let Some(secs) = record.metadata.duration_secs {
        row("Duration", format!("{}:{:02}", secs / 60, secs % 60));
    }
    if let Some(url) = &record.metadata.source_url {
        row("URL", url.clone());
    }
}
