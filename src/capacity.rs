//! Fitting cached artifacts onto a disc
//!
//! Selection is a single forward greedy pass in input order, so playlist
//! order is preserved on the disc. An item that does not fit is skipped and
//! later, smaller items may still be included.

use crate::cache::ArtifactRecord;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, trace, warn};

const GIB: u64 = 1024 * 1024 * 1024;

/// Anything with a size in bytes
pub trait ByteSize {
    fn byte_size(&self) -> u64;

    /// Human-readable name used when logging exclusions
    fn label(&self) -> Option<String> {
        None
    }
}

impl ByteSize for u64 {
    fn byte_size(&self) -> u64 {
        *self
    }
}

impl ByteSize for ArtifactRecord {
    fn byte_size(&self) -> u64 {
        self.file_size
    }

    fn label(&self) -> Option<String> {
        Some(match &self.metadata.title {
            Some(title) => format!("{} ({})", self.key, title),
            None => self.key.clone(),
        })
    }
}

impl<T: ByteSize> ByteSize for &T {
    fn byte_size(&self) -> u64 {
        (**self).byte_size()
    }

    fn label(&self) -> Option<String> {
        (**self).label()
    }
}

/// Byte budget of a target medium
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityBudget {
    pub limit_bytes: u64,
}

impl CapacityBudget {
    /// Single-layer DVD-5, 4.7 GiB
    pub const DVD_SINGLE_LAYER: Self = Self {
        limit_bytes: 47 * GIB / 10,
    };

    /// Dual-layer DVD-9, 8.5 GiB
    pub const DVD_DUAL_LAYER: Self = Self {
        limit_bytes: 85 * GIB / 10,
    };

    pub fn from_bytes(limit_bytes: u64) -> Self {
        Self { limit_bytes }
    }

    /// Budget from binary gigabytes; negative and NaN become zero
    pub fn from_gib(gib: f64) -> Self {
        Self {
            limit_bytes: (gib * GIB as f64) as u64,
        }
    }

    pub fn as_gib(&self) -> f64 {
        gib(self.limit_bytes)
    }
}

impl Default for CapacityBudget {
    fn default() -> Self {
        Self::DVD_SINGLE_LAYER
    }
}

impl fmt::Display for CapacityBudget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2} GiB", self.as_gib())
    }
}

/// Partition of the input into what fits and what does not
#[derive(Debug, Clone, PartialEq)]
pub struct CapacitySelection<T> {
    /// Included items, in input order
    pub included: Vec<T>,
    /// Excluded items, in input order
    pub excluded: Vec<T>,
    pub included_total: u64,
    pub excluded_total: u64,
}

impl<T> CapacitySelection<T> {
    pub fn has_exclusions(&self) -> bool {
        !self.excluded.is_empty()
    }
}

/// Stateless greedy selector
pub struct CapacitySelector;

impl CapacitySelector {
    /// Include each item iff it still fits after everything included so far
    pub fn select<T, I>(items: I, budget: CapacityBudget) -> CapacitySelection<T>
    where
        T: ByteSize,
        I: IntoIterator<Item = T>,
    {
        let mut selection = CapacitySelection {
            included: Vec::new(),
            excluded: Vec::new(),
            included_total: 0,
            excluded_total: 0,
        };

        for (index, item) in items.into_iter().enumerate() {
            let size = item.byte_size();

            match selection.included_total.checked_add(size) {
                Some(total) if total <= budget.limit_bytes => {
                    trace!(
                        "Including item {}: {} bytes (total {})",
                        index,
                        size,
                        total
                    );
                    selection.included_total = total;
                    selection.included.push(item);
                }
                _ => {
                    debug!(
                        "Excluding {}: {:.2} GiB would exceed {}",
                        item.label().unwrap_or_else(|| format!("item {}", index)),
                        gib(size),
                        budget
                    );
                    selection.excluded_total = selection.excluded_total.saturating_add(size);
                    selection.excluded.push(item);
                }
            }
        }

        if selection.has_exclusions() {
            warn!(
                "Capacity selection: {} included ({:.2} GiB), {} excluded ({:.2} GiB)",
                selection.included.len(),
                gib(selection.included_total),
                selection.excluded.len(),
                gib(selection.excluded_total)
            );
        } else {
            info!(
                "All {} items fit ({:.2} GiB / {})",
                selection.included.len(),
                gib(selection.included_total),
                budget
            );
        }

        selection
    }
}

fn gib(bytes: u64) -> f64 {
    bytes as f64 / GIB as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{ArtifactMetadata, Namespace};
    use chrono::Utc;

    #[test]
    fn greedy_skips_what_does_not_fit() {
        let budget = CapacityBudget::from_gib(4.7);
        let selection = CapacitySelector::select([GIB, GIB, 5 * GIB], budget);

        assert_eq!(selection.included, vec![GIB, GIB]);
        assert_eq!(selection.excluded, vec![5 * GIB]);
        assert_eq!(selection.included_total, 2 * GIB);
        assert_eq!(selection.excluded_total, 5 * GIB);
        assert!(selection.has_exclusions());
    }

    #[test]
    fn later_smaller_items_still_fit() {
        let budget = CapacityBudget::from_bytes(10);
        let selection = CapacitySelector::select([6u64, 5, 4, 1], budget);

        assert_eq!(selection.included, vec![6, 4]);
        assert_eq!(selection.excluded, vec![5, 1]);
        assert_eq!(selection.included_total, 10);
    }

    #[test]
    fn empty_input() {
        let selection = CapacitySelector::select(Vec::<u64>::new(), CapacityBudget::default());
        assert!(selection.included.is_empty());
        assert!(!selection.has_exclusions());
        assert_eq!(selection.included_total, 0);
        assert_eq!(selection.excluded_total, 0);
    }

    #[test]
    fn oversize_item_is_excluded_not_truncated() {
        let selection =
            CapacitySelector::select([10 * GIB], CapacityBudget::DVD_SINGLE_LAYER);
        assert!(selection.included.is_empty());
        assert_eq!(selection.excluded, vec![10 * GIB]);
    }

    #[test]
    fn zero_sized_items_always_fit() {
        let selection = CapacitySelector::select([0u64, 0], CapacityBudget::from_bytes(0));
        assert_eq!(selection.included.len(), 2);
    }

    #[test]
    fn exact_fit_is_included() {
        let selection = CapacitySelector::select([5u64, 5], CapacityBudget::from_bytes(10));
        assert_eq!(selection.included, vec![5, 5]);
    }

    #[test]
    fn overflowing_sizes_are_excluded() {
        let selection =
            CapacitySelector::select([u64::MAX, 1, u64::MAX], CapacityBudget::from_bytes(u64::MAX));
        assert_eq!(selection.included, vec![u64::MAX]);
        assert_eq!(selection.excluded, vec![1, u64::MAX]);
        assert_eq!(selection.excluded_total, u64::MAX);
    }

    #[test]
    fn budgets() {
        assert_eq!(CapacityBudget::DVD_DUAL_LAYER.limit_bytes, 9_126_805_504);
        assert_eq!(CapacityBudget::from_gib(-1.0).limit_bytes, 0);
        assert_eq!(CapacityBudget::from_gib(1.0).limit_bytes, GIB);
        assert_eq!(CapacityBudget::default(), CapacityBudget::DVD_SINGLE_LAYER);
    }

    #[test]
    fn selects_records_by_reference_in_order() {
        let record = |key: &str, size: u64| ArtifactRecord {
            key: key.to_string(),
            namespace: Namespace::Converted,
            file_path: format!("/cache/converted/{key}.mpg").into(),
            file_size: size,
            checksum: String::new(),
            format: "mpg".to_string(),
            metadata: ArtifactMetadata::default(),
            cached_at: Utc::now(),
        };
        let records = vec![record("a", 3 * GIB), record("b", 2 * GIB), record("c", GIB)];

        let selection = CapacitySelector::select(&records, CapacityBudget::DVD_SINGLE_LAYER);
        let keys: Vec<&str> = selection.included.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["a", "c"]);
        assert_eq!(selection.excluded[0].label().as_deref(), Some("b"));
    }
}
