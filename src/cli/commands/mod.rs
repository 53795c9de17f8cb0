//! CLI command implementations

pub mod check;
pub mod clear;
pub mod config;
pub mod fit;
pub mod gc;
pub mod get;
pub mod stats;
pub mod store;

pub use check::execute as check;
pub use clear::execute as clear;
pub use config::execute as config;
pub use fit::execute as fit;
pub use gc::execute as gc;
pub use get::execute as get;
pub use stats::execute as stats;
pub use store::execute as store;

/// Render a byte count with a binary unit
pub(crate) fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

/// First characters of a checksum for display
pub(crate) fn short_checksum(checksum: &str) -> &str {
    checksum.get(..12).unwrap_or(checksum)
}
