//! Error types for dvdcache
//!
//! All modules use `CacheResult<T>` as their return type. Cache misses and
//! integrity mismatches are not errors: reads return `Option` instead.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for dvdcache operations
pub type CacheResult<T> = Result<T, CacheError>;

/// All errors that can occur in dvdcache
#[derive(Error, Debug)]
pub enum CacheError {
    // Lock errors
    #[error("Timed out after {waited:?} waiting for lock {path}")]
    LockTimeout { path: PathBuf, waited: Duration },

    #[error("Lock state error: {0}")]
    LockState(String),

    // Store errors
    #[error("Source file does not exist: {0}")]
    SourceMissing(PathBuf),

    #[error("Invalid cache key {key:?}: {reason}")]
    InvalidKey { key: String, reason: String },

    #[error("Copy verification failed for {path}: expected {expected} bytes, copied {actual}")]
    CopyVerification {
        path: PathBuf,
        expected: u64,
        actual: u64,
    },

    #[error("Failed to store {namespace}/{key}: {reason}")]
    StoreFailed {
        key: String,
        namespace: String,
        reason: String,
    },

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("{0}")]
    User(String),
}

impl CacheError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create an aggregated store failure
    pub fn store_failed(
        key: impl Into<String>,
        namespace: impl ToString,
        reason: impl Into<String>,
    ) -> Self {
        Self::StoreFailed {
            key: key.into(),
            namespace: namespace.to_string(),
            reason: reason.into(),
        }
    }

    /// Check if error is retryable
    ///
    /// Lock state errors are programmer errors and never retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::LockTimeout { .. } | Self::Io { .. })
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::LockTimeout { .. } => {
                Some("Another process is writing this entry. Retry, or remove the lock if it is stale")
            }
            Self::StoreFailed { .. } | Self::CopyVerification { .. } => {
                Some("No partial entry was left behind; rerun the step to retry")
            }
            Self::ConfigInvalid { .. } => Some("Run: dvdcache config init --force"),
            _ => None,
        }
    }
}
