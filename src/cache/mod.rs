//! Artifact cache shared by the download and conversion stages
//!
//! Entries are keyed by `(namespace, key)`, where the key is a video id.
//! Writers serialize per key through a lock file; readers never lock and
//! instead validate what they find.
//!
//! # Entry States
//!
//! | State | On disk | `is_cached` |
//! |-------|---------|-------------|
//! | Absent | nothing | false |
//! | Staging | `.in-progress/<file>` and lock | false |
//! | Promoted | final file and lock, no fresh sidecar | false |
//! | Complete | final file and sidecar | true |
//! | Corrupt | size or sidecar mismatch | false |

pub mod integrity;
pub mod layout;
pub mod record;
pub mod store;
pub mod sweep;

pub use integrity::sha256_file;
pub use layout::CacheLayout;
pub use record::{validate_key, ArtifactMetadata, ArtifactRecord, Namespace};
pub use store::{ArtifactStore, StoreOptions, Verification};
pub use sweep::{CacheStats, CleanupStats, DirStats};
