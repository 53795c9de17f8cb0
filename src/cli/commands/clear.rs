//! Clear command - remove one namespace

use crate::cache::ArtifactStore;
use crate::cli::args::ClearArgs;
use crate::cli::commands::format_size;
use crate::error::CacheResult;
use console::style;
use std::io::{self, Write};

/// Execute the clear command
pub async fn execute(args: ClearArgs, store: &ArtifactStore) -> CacheResult<()> {
    let preview = store.clear(args.namespace, true).await;

    if preview.files_removed == 0 {
        println!("No {} entries to clear.", args.namespace);
        return Ok(());
    }

    println!(
        "This will remove {} file(s) ({}) from {}.",
        preview.files_removed,
        format_size(preview.bytes_freed),
        args.namespace
    );

    if args.dry_run {
        println!();
        println!("Dry run - nothing removed.");
        return Ok(());
    }

    if !args.yes {
        print!("Are you sure? [y/N] ");
        let _ = io::stdout().flush();

        let mut input = String::new();
        if io::stdin().read_line(&mut input).is_err() {
            println!("Failed to read input, aborting.");
            return Ok(());
        }

        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Aborted.");
            return Ok(());
        }
    }

    let stats = store.clear(args.namespace, false).await;
    println!(
        "{} cleared {} file(s), {} freed",
        style("✓").green(),
        stats.files_removed,
        format_size(stats.bytes_freed)
    );

    if stats.errors > 0 {
        println!(
            "{} {} file(s) could not be removed",
            style("!").yellow(),
            stats.errors
        );
    }

    Ok(())
}
