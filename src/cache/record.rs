//! Cache entry types: namespaces, keys, metadata and records

use crate::error::{CacheError, CacheResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Logical cache bucket with its own storage directory and key space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Namespace {
    /// Source media as fetched by the downloader
    Downloads,
    /// DVD-compliant output of the converter
    Converted,
}

impl Namespace {
    /// Storage directory name under the cache root
    pub fn dir_name(&self) -> &'static str {
        match self {
            Self::Downloads => "downloads",
            Self::Converted => "converted",
        }
    }

    /// Format assumed when a stored file carries no extension
    pub fn default_format(&self) -> &'static str {
        match self {
            Self::Downloads => "mp4",
            Self::Converted => "mpg",
        }
    }

    /// All namespaces
    pub fn all() -> &'static [Self] {
        &[Self::Downloads, Self::Converted]
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.dir_name())
    }
}

impl FromStr for Namespace {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "downloads" | "download" => Ok(Self::Downloads),
            "converted" | "convert" => Ok(Self::Converted),
            other => Err(format!(
                "unknown namespace '{other}' (expected downloads or converted)"
            )),
        }
    }
}

/// Validate an artifact key
///
/// Keys become file names, so separators, `..` and NUL are rejected. Leading
/// dots are reserved for staging and lock bookkeeping.
pub fn validate_key(key: &str) -> CacheResult<()> {
    let reason = if key.is_empty() {
        Some("key is empty")
    } else if key.contains('/') || key.contains('\\') {
        Some("key contains a path separator")
    } else if key.contains("..") {
        Some("key contains '..'")
    } else if key.contains('\0') {
        Some("key contains NUL")
    } else if key.starts_with('.') {
        Some("key starts with '.'")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(CacheError::InvalidKey {
            key: key.to_string(),
            reason: reason.to_string(),
        }),
        None => Ok(()),
    }
}

/// Producer-supplied description of an artifact
///
/// Every field is optional; anything without a dedicated field goes in
/// `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// A cached artifact as seen by consumers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArtifactRecord {
    pub key: String,
    pub namespace: Namespace,
    /// Final path of the artifact bytes
    pub file_path: PathBuf,
    pub file_size: u64,
    /// SHA-256, lowercase hex
    pub checksum: String,
    /// File extension without the dot
    pub format: String,
    pub metadata: ArtifactMetadata,
    pub cached_at: DateTime<Utc>,
}

/// JSON sidecar persisted next to each artifact under `metadata/`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Sidecar {
    pub key: String,
    pub namespace: Namespace,
    pub file_name: String,
    pub file_size: u64,
    pub checksum: String,
    pub format: String,
    pub cached_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: ArtifactMetadata,
}

impl Sidecar {
    /// File name is a single plain component
    pub fn has_plain_file_name(&self) -> bool {
        Path::new(&self.file_name).file_name().and_then(|n| n.to_str())
            == Some(self.file_name.as_str())
            && !self.file_name.starts_with('.')
    }

    pub fn into_record(self, file_path: PathBuf) -> ArtifactRecord {
        ArtifactRecord {
            key: self.key,
            namespace: self.namespace,
            file_path,
            file_size: self.file_size,
            checksum: self.checksum,
            format: self.format,
            metadata: self.metadata,
            cached_at: self.cached_at,
        }
    }
}
