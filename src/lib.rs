//! dvdcache - Crash-tolerant artifact cache for DVD media pipelines
//!
//! Downloaded and converted videos are shared between cooperating
//! processes through a cache directory guarded by per-key lock files.
//! Cached conversions are then packed onto a disc by a greedy capacity
//! selector.

pub mod cache;
pub mod capacity;
pub mod cli;
pub mod config;
pub mod error;
pub mod lock;

pub use error::{CacheError, CacheResult};
