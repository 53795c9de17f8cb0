//! Configuration schema for dvdcache
//!
//! Configuration is stored at `~/.config/dvdcache/config.toml`

use crate::cache::{Namespace, StoreOptions, Verification};
use crate::capacity::CapacityBudget;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Cache location and read policy
    pub cache: CacheConfig,

    /// Writer lock tuning
    pub lock: LockConfig,

    /// Disc capacity
    pub capacity: CapacityConfig,
}

impl Config {
    /// Check values serde cannot reject on its own
    pub fn validate(&self) -> Result<(), String> {
        if !matches!(self.general.log_format.as_str(), "text" | "json") {
            return Err(format!(
                "general.log_format must be \"text\" or \"json\", got {:?}",
                self.general.log_format
            ));
        }
        if self.lock.timeout_secs == 0 {
            return Err("lock.timeout_secs must be greater than zero".to_string());
        }
        if self.lock.stale_after_secs == 0 {
            return Err("lock.stale_after_secs must be greater than zero".to_string());
        }
        if !self.capacity.budget_gib.is_finite() || self.capacity.budget_gib <= 0.0 {
            return Err(format!(
                "capacity.budget_gib must be a positive number, got {}",
                self.capacity.budget_gib
            ));
        }
        Ok(())
    }

    /// Store options described by the `[cache]` and `[lock]` sections
    pub fn store_options(&self) -> StoreOptions {
        let mut options = StoreOptions {
            lock_timeout: Duration::from_secs(self.lock.timeout_secs),
            lock_retries: self.lock.max_retries,
            retry_delay: Duration::from_millis(self.lock.retry_delay_ms),
            stale_after: Duration::from_secs(self.lock.stale_after_secs),
            verification: self.cache.verification,
            ..StoreOptions::default()
        };
        if self.cache.force_download {
            options = options.force(Namespace::Downloads);
        }
        if self.cache.force_convert {
            options = options.force(Namespace::Converted);
        }
        options
    }

    pub fn budget(&self) -> CapacityBudget {
        CapacityBudget::from_gib(self.capacity.budget_gib)
    }
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
        }
    }
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Cache root (default: platform cache dir)
    pub root: Option<PathBuf>,

    /// `gc` removes files older than N days
    pub gc_days: u32,

    /// Verification on retrieve: "checksum" or "size"
    pub verification: Verification,

    /// Ignore cached downloads (always re-download)
    pub force_download: bool,

    /// Ignore cached conversions (always re-convert)
    pub force_convert: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            root: None,
            gc_days: 30,
            verification: Verification::Checksum,
            force_download: false,
            force_convert: false,
        }
    }
}

/// Lock configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    /// Timeout of each acquisition attempt
    pub timeout_secs: u64,

    /// Locks older than this are reclaimed
    pub stale_after_secs: u64,

    /// Retries after the first attempt
    pub max_retries: u32,

    /// Initial backoff, doubled per retry
    pub retry_delay_ms: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 60,
            stale_after_secs: 300,
            max_retries: 3,
            retry_delay_ms: 500,
        }
    }
}

/// Capacity configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CapacityConfig {
    /// Disc budget in GiB (4.7 single layer, 8.5 dual layer)
    pub budget_gib: f64,
}

impl Default for CapacityConfig {
    fn default() -> Self {
        Self { budget_gib: 4.7 }
    }
}
