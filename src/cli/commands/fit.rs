//! Fit command - plan which conversions go on the disc

use crate::cache::{ArtifactRecord, ArtifactStore, Namespace};
use crate::capacity::{CapacityBudget, CapacitySelection, CapacitySelector};
use crate::cli::args::{FitArgs, OutputFormat};
use crate::cli::commands::format_size;
use crate::config::Config;
use crate::error::CacheResult;
use console::style;
use serde::Serialize;
use tracing::debug;

/// Execute the fit command
pub async fn execute(args: FitArgs, store: &ArtifactStore, config: &Config) -> CacheResult<()> {
    let budget = if args.dual_layer {
        CapacityBudget::DVD_DUAL_LAYER
    } else {
        args.budget_gib
            .map(CapacityBudget::from_gib)
            .unwrap_or_else(|| config.budget())
    };
    debug!("Fitting {} key(s) into {}", args.keys.len(), budget);

    let mut records = Vec::new();
    let mut missing = Vec::new();
    for key in &args.keys {
        match store.retrieve(key, Namespace::Converted).await {
            Some(record) => records.push(record),
            None => missing.push(key.clone()),
        }
    }

    let selection = CapacitySelector::select(records, budget);

    match args.format {
        OutputFormat::Table => print_fit_table(&selection, &missing, budget),
        OutputFormat::Json => print_fit_json(&selection, &missing, budget)?,
        OutputFormat::Plain => {
            for record in &selection.included {
                println!("{}", record.file_path.display());
            }
        }
    }

    Ok(())
}

fn print_fit_table(
    selection: &CapacitySelection<ArtifactRecord>,
    missing: &[String],
    budget: CapacityBudget,
) {
    println!("{:<20} {:>12}  {:<10} {}", "KEY", "SIZE", "STATUS", "TITLE");
    println!("{}", "-".repeat(70));

    let rows = selection
        .included
        .iter()
        .map(|r| (r, style("included").green()))
        .chain(
            selection
                .excluded
                .iter()
                .map(|r| (r, style("excluded").red())),
        );
    for (record, status) in rows {
        println!(
            "{:<20} {:>12}  {:<10} {}",
            record.key,
            format_size(record.file_size),
            status,
            record.metadata.title.as_deref().unwrap_or("")
        );
    }
    for key in missing {
        println!(
            "{:<20} {:>12}  {:<10}",
            key,
            "-",
            style("missing").dim()
        );
    }

    println!();
    println!(
        "Included: {} ({} of {})",
        selection.included.len(),
        format_size(selection.included_total),
        budget
    );
    if selection.has_exclusions() {
        println!(
            "{} {} excluded ({})",
            style("!").yellow(),
            selection.excluded.len(),
            format_size(selection.excluded_total)
        );
    }
    if !missing.is_empty() {
        println!(
            "{} {} not cached as conversions",
            style("!").yellow(),
            missing.len()
        );
    }
}

fn print_fit_json(
    selection: &CapacitySelection<ArtifactRecord>,
    missing: &[String],
    budget: CapacityBudget,
) -> CacheResult<()> {
    #[derive(Serialize)]
    struct FitJson<'a> {
        budget_bytes: u64,
        included: &'a [ArtifactRecord],
        excluded: &'a [ArtifactRecord],
        missing: &'a [String],
        included_bytes: u64,
        excluded_bytes: u64,
    }

    let json = FitJson {
        budget_bytes: budget.limit_bytes,
        included: &selection.included,
        excluded: &selection.excluded,
        missing,
        included_bytes: selection.included_total,
        excluded_bytes: selection.excluded_total,
    };

    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
