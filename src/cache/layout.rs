//! On-disk layout of a cache root
//!
//! ```text
//! <root>/
//!   downloads/<key>.<format>
//!   downloads/.in-progress/
//!   converted/<key>.<format>
//!   converted/.in-progress/
//!   metadata/<namespace>-<key>.json
//!   metadata/doc-<name>.json
//!   metadata/.in-progress/
//!   .locks/<namespace>-<key>.lock
//! ```

use crate::cache::record::Namespace;
use std::path::{Path, PathBuf};

/// Name of the staging subdirectory inside every storage directory
pub const STAGING_DIR: &str = ".in-progress";

const METADATA_DIR: &str = "metadata";
const LOCKS_DIR: &str = ".locks";

/// Path arithmetic for one cache root
#[derive(Debug, Clone)]
pub struct CacheLayout {
    root: PathBuf,
}

impl CacheLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn namespace_dir(&self, namespace: Namespace) -> PathBuf {
        self.root.join(namespace.dir_name())
    }

    pub fn staging_dir(&self, namespace: Namespace) -> PathBuf {
        self.namespace_dir(namespace).join(STAGING_DIR)
    }

    pub fn metadata_dir(&self) -> PathBuf {
        self.root.join(METADATA_DIR)
    }

    pub fn metadata_staging_dir(&self) -> PathBuf {
        self.metadata_dir().join(STAGING_DIR)
    }

    pub fn locks_dir(&self) -> PathBuf {
        self.root.join(LOCKS_DIR)
    }

    /// The three storage directories swept by cleanup and stats
    pub fn storage_dirs(&self) -> [(&'static str, PathBuf); 3] {
        [
            ("downloads", self.namespace_dir(Namespace::Downloads)),
            ("converted", self.namespace_dir(Namespace::Converted)),
            (METADATA_DIR, self.metadata_dir()),
        ]
    }

    /// Every directory that must exist for the store to operate
    pub fn all_dirs(&self) -> Vec<PathBuf> {
        let mut dirs = vec![self.root.clone()];
        for namespace in Namespace::all() {
            dirs.push(self.namespace_dir(*namespace));
            dirs.push(self.staging_dir(*namespace));
        }
        dirs.push(self.metadata_dir());
        dirs.push(self.metadata_staging_dir());
        dirs.push(self.locks_dir());
        dirs
    }

    pub fn artifact_file_name(key: &str, format: &str) -> String {
        if format.is_empty() {
            key.to_string()
        } else {
            format!("{}.{}", key, format)
        }
    }

    pub fn final_path(&self, namespace: Namespace, key: &str, format: &str) -> PathBuf {
        self.namespace_dir(namespace)
            .join(Self::artifact_file_name(key, format))
    }

    pub fn staging_path(&self, namespace: Namespace, key: &str, format: &str) -> PathBuf {
        self.staging_dir(namespace)
            .join(Self::artifact_file_name(key, format))
    }

    pub fn sidecar_path(&self, namespace: Namespace, key: &str) -> PathBuf {
        self.metadata_dir()
            .join(format!("{}-{}.json", namespace, key))
    }

    /// Sidecar file name prefix shared by every entry of a namespace
    pub fn sidecar_prefix(namespace: Namespace) -> String {
        format!("{}-", namespace)
    }

    pub fn lock_path(&self, namespace: Namespace, key: &str) -> PathBuf {
        self.locks_dir().join(format!("{}-{}.lock", namespace, key))
    }

    pub fn document_path(&self, name: &str) -> PathBuf {
        self.metadata_dir().join(format!("doc-{}.json", name))
    }

    pub fn document_lock_path(&self, name: &str) -> PathBuf {
        self.locks_dir().join(format!("doc-{}.lock", name))
    }
}

/// Whether `file_name` names the artifact stored under `key`
///
/// Matches `<key>` and `<key>.<ext>` where the extension has no further dot.
pub fn names_artifact(file_name: &str, key: &str) -> bool {
    match file_name.strip_prefix(key) {
        Some("") => true,
        Some(rest) => rest
            .strip_prefix('.')
            .is_some_and(|ext| !ext.is_empty() && !ext.contains('.')),
        None => false,
    }
}
