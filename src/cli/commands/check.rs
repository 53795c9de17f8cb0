//! Check command - report whether an entry is cached

use crate::cache::ArtifactStore;
use crate::cli::args::CheckArgs;
use crate::error::{CacheError, CacheResult};
use console::style;

/// Execute the check command
///
/// A miss is reported as an error so scripts can branch on the exit status.
pub async fn execute(args: CheckArgs, store: &ArtifactStore) -> CacheResult<()> {
    if store.is_cached(&args.key, args.namespace).await {
        if !args.quiet {
            println!(
                "{} {}/{} is cached",
                style("✓").green(),
                args.namespace,
                args.key
            );
        }
        Ok(())
    } else {
        Err(CacheError::User(format!(
            "{}/{} is not cached",
            args.namespace, args.key
        )))
    }
}
