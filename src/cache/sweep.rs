//! Age-based sweeping, namespace clearing and usage statistics

use crate::cache::layout::CacheLayout;
use crate::cache::record::Namespace;
use crate::cache::store::ArtifactStore;
use serde::Serialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::fs;
use tracing::{debug, info, trace, warn};

/// Outcome of a sweep or clear
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CleanupStats {
    pub files_removed: usize,
    pub bytes_freed: u64,
    /// Files or directories that could not be inspected or removed
    pub errors: usize,
}

impl CleanupStats {
    pub fn merge(&mut self, other: CleanupStats) {
        self.files_removed += other.files_removed;
        self.bytes_freed += other.bytes_freed;
        self.errors += other.errors;
    }
}

/// Usage of one storage directory
#[derive(Debug, Clone, Serialize)]
pub struct DirStats {
    pub name: String,
    pub path: PathBuf,
    pub files: usize,
    pub bytes: u64,
}

/// Usage of a whole cache root
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub root: PathBuf,
    pub dirs: Vec<DirStats>,
    pub total_files: usize,
    pub total_bytes: u64,
}

#[derive(Default)]
struct Walk {
    files: Vec<(PathBuf, std::fs::Metadata)>,
    errors: usize,
}

impl ArtifactStore {
    /// Delete files older than `max_age` from every storage directory
    ///
    /// Hidden names are skipped, which keeps staging directories and lock
    /// files out of the sweep. Per-file failures are counted, not returned.
    pub async fn cleanup(&self, max_age: Duration, dry_run: bool) -> CleanupStats {
        // an age beyond the epoch makes nothing old enough
        let cutoff = SystemTime::now().checked_sub(max_age);
        let mut total = CleanupStats::default();

        for (name, dir) in self.layout.storage_dirs() {
            let walk = walk_files(&dir).await;
            let mut stats = CleanupStats {
                errors: walk.errors,
                ..Default::default()
            };

            for (path, meta) in walk.files {
                let modified = match meta.modified() {
                    Ok(modified) => modified,
                    Err(e) => {
                        warn!("Failed to read mtime of {}: {}", path.display(), e);
                        stats.errors += 1;
                        continue;
                    }
                };
                if cutoff.is_some_and(|cutoff| modified < cutoff) {
                    remove_counted(&path, meta.len(), dry_run, &mut stats).await;
                }
            }

            debug!(
                "Swept {}: {} files, {} bytes, {} errors",
                name, stats.files_removed, stats.bytes_freed, stats.errors
            );
            total.merge(stats);
        }

        info!(
            "Cache cleanup {}: {} files, {:.1} MB freed, {} errors",
            if dry_run { "preview" } else { "complete" },
            total.files_removed,
            total.bytes_freed as f64 / (1024.0 * 1024.0),
            total.errors
        );
        total
    }

    /// Remove every artifact and sidecar of one namespace
    pub async fn clear(&self, namespace: Namespace, dry_run: bool) -> CleanupStats {
        let mut stats = CleanupStats::default();

        let artifacts = walk_files(&self.layout.namespace_dir(namespace)).await;
        stats.errors += artifacts.errors;
        for (path, meta) in artifacts.files {
            remove_counted(&path, meta.len(), dry_run, &mut stats).await;
        }

        let prefix = CacheLayout::sidecar_prefix(namespace);
        let metadata = walk_files(&self.layout.metadata_dir()).await;
        stats.errors += metadata.errors;
        for (path, meta) in metadata.files {
            let is_sidecar = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(&prefix) && n.ends_with(".json"));
            if is_sidecar {
                remove_counted(&path, meta.len(), dry_run, &mut stats).await;
            }
        }

        info!(
            "Cleared {} cache: {} files, {:.1} MB",
            namespace,
            stats.files_removed,
            stats.bytes_freed as f64 / (1024.0 * 1024.0)
        );
        stats
    }

    /// File counts and sizes per storage directory
    pub async fn stats(&self) -> CacheStats {
        let mut dirs = Vec::new();

        for (name, path) in self.layout.storage_dirs() {
            let walk = walk_files(&path).await;
            dirs.push(DirStats {
                name: name.to_string(),
                files: walk.files.len(),
                bytes: walk.files.iter().map(|(_, meta)| meta.len()).sum(),
                path,
            });
        }

        CacheStats {
            root: self.layout.root().to_path_buf(),
            total_files: dirs.iter().map(|d| d.files).sum(),
            total_bytes: dirs.iter().map(|d| d.bytes).sum(),
            dirs,
        }
    }
}

/// Every regular, non-hidden file under `root`
async fn walk_files(root: &Path) -> Walk {
    let mut walk = Walk::default();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => continue,
            Err(e) => {
                warn!("Failed to read directory {}: {}", dir.display(), e);
                walk.errors += 1;
                continue;
            }
        };

        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!("Failed to list {}: {}", dir.display(), e);
                    walk.errors += 1;
                    break;
                }
            };

            if entry.file_name().to_string_lossy().starts_with('.') {
                continue;
            }

            let path = entry.path();
            match entry.metadata().await {
                Ok(meta) if meta.is_dir() => pending.push(path),
                Ok(meta) if meta.is_file() => walk.files.push((path, meta)),
                Ok(_) => trace!("Skipping {}", path.display()),
                Err(e) => {
                    warn!("Failed to inspect {}: {}", path.display(), e);
                    walk.errors += 1;
                }
            }
        }
    }

    walk
}

async fn remove_counted(path: &Path, len: u64, dry_run: bool, stats: &mut CleanupStats) {
    if dry_run {
        debug!("Would remove {}", path.display());
        stats.files_removed += 1;
        stats.bytes_freed += len;
        return;
    }

    match fs::remove_file(path).await {
        Ok(()) => {
            trace!("Removed {}", path.display());
            stats.files_removed += 1;
            stats.bytes_freed += len;
        }
        // removed concurrently
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => {
            warn!("Failed to remove {}: {}", path.display(), e);
            stats.errors += 1;
        }
    }
}
