//! Artifact store: per-key atomic writes and integrity-checked reads
//!
//! Producers hand finished files to [`ArtifactStore::store`]; the bytes are
//! copied into the namespace's staging directory, verified, and renamed into
//! place before the JSON sidecar is written. Readers never lock: a rename is
//! atomic, and every read re-checks the entry against its sidecar. Anything
//! that does not check out is a miss.

use crate::cache::integrity::{sha256_file, write_atomic};
use crate::cache::layout::{names_artifact, CacheLayout};
use crate::cache::record::{validate_key, ArtifactMetadata, ArtifactRecord, Namespace, Sidecar};
use crate::error::{CacheError, CacheResult};
use crate::lock::{ProcessProbe, RetryableLock, SystemProbe, DEFAULT_STALE_AFTER};
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tracing::{debug, error, info, info_span, trace, warn, Instrument};

/// How much of an entry `retrieve` re-verifies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verification {
    /// On-disk size must match the sidecar
    Size,
    /// Size, plus the SHA-256 of the bytes must match the sidecar
    #[default]
    Checksum,
}

/// Tuning for an [`ArtifactStore`]
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Timeout of each lock acquisition attempt
    pub lock_timeout: Duration,
    /// Lock retries after the first attempt
    pub lock_retries: u32,
    /// Initial backoff between lock attempts
    pub retry_delay: Duration,
    /// Age after which another writer's lock is reclaimed
    pub stale_after: Duration,
    pub verification: Verification,
    /// Namespaces whose entries are always reported as misses
    pub forced: HashSet<Namespace>,
    pub probe: Arc<dyn ProcessProbe>,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_secs(60),
            lock_retries: 3,
            retry_delay: Duration::from_millis(500),
            stale_after: DEFAULT_STALE_AFTER,
            verification: Verification::default(),
            forced: HashSet::new(),
            probe: Arc::new(SystemProbe),
        }
    }
}

impl StoreOptions {
    /// Ignore existing entries of `namespace` (re-download / re-convert)
    pub fn force(mut self, namespace: Namespace) -> Self {
        self.forced.insert(namespace);
        self
    }
}

/// An entry that passed the read-side checks
struct Located {
    path: PathBuf,
    sidecar: Option<Sidecar>,
}

/// Paths and inputs of one `store` call
struct WritePlan<'a> {
    key: &'a str,
    namespace: Namespace,
    source: &'a Path,
    format: String,
    staging: PathBuf,
    final_path: PathBuf,
}

impl WritePlan<'_> {
    fn file_name(&self) -> String {
        CacheLayout::artifact_file_name(self.key, &self.format)
    }
}

/// Crash-tolerant artifact cache shared by cooperating processes
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    pub(super) layout: CacheLayout,
    options: StoreOptions,
}

impl ArtifactStore {
    /// Open a cache root, creating its directory tree
    pub async fn open(root: impl Into<PathBuf>, options: StoreOptions) -> CacheResult<Self> {
        let layout = CacheLayout::new(root);

        for dir in layout.all_dirs() {
            fs::create_dir_all(&dir).await.map_err(|e| {
                CacheError::io(format!("creating cache directory {}", dir.display()), e)
            })?;
        }

        debug!("Opened artifact store at {}", layout.root().display());
        Ok(Self { layout, options })
    }

    pub fn root(&self) -> &Path {
        self.layout.root()
    }

    pub fn layout(&self) -> &CacheLayout {
        &self.layout
    }

    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    /// Whether a complete, size-consistent entry exists
    ///
    /// Never fails: unreadable or inconsistent state is reported as `false`.
    pub async fn is_cached(&self, key: &str, namespace: Namespace) -> bool {
        self.locate(key, namespace).await.is_some()
    }

    /// Fetch an entry's record, or `None` on any miss
    pub async fn retrieve(&self, key: &str, namespace: Namespace) -> Option<ArtifactRecord> {
        let located = self.locate(key, namespace).await?;

        let Some(sidecar) = located.sidecar else {
            debug!(
                "No metadata for {} {}, treating as not cached",
                namespace, key
            );
            return None;
        };

        if self.options.verification == Verification::Checksum {
            match sha256_file(&located.path).await {
                Ok(actual) if actual == sidecar.checksum => {}
                Ok(actual) => {
                    warn!(
                        "Checksum mismatch for {} {}: expected {}, actual {}",
                        namespace, key, sidecar.checksum, actual
                    );
                    return None;
                }
                Err(e) => {
                    warn!("Failed to verify {} {}: {}", namespace, key, e);
                    return None;
                }
            }
        }

        debug!("Retrieved cached {} for {}", namespace, key);
        Some(sidecar.into_record(located.path))
    }

    /// Atomically cache `source` under `key`, superseding any previous entry
    ///
    /// `source` is copied, never moved. On failure no partial entry is left
    /// visible and a single aggregated error is returned.
    pub async fn store(
        &self,
        key: &str,
        namespace: Namespace,
        source: &Path,
        metadata: ArtifactMetadata,
    ) -> CacheResult<ArtifactRecord> {
        let span = info_span!("store", key = %key, namespace = %namespace);
        self.store_locked(key, namespace, source, metadata)
            .instrument(span)
            .await
    }

    /// Persist a JSON document (e.g. playlist metadata) under `name`
    pub async fn store_document<T: Serialize>(&self, name: &str, value: &T) -> CacheResult<()> {
        validate_key(name)?;
        let json = serde_json::to_vec_pretty(value)?;

        let guard = self
            .lock_for(self.layout.document_lock_path(name))
            .acquire()
            .await?;
        write_atomic(
            &self.layout.document_path(name),
            &self.layout.metadata_staging_dir(),
            &json,
        )
        .await?;
        guard.release()?;

        debug!("Stored document {}", name);
        Ok(())
    }

    /// Load a JSON document; missing or corrupt documents are `None`
    pub async fn load_document<T: DeserializeOwned>(&self, name: &str) -> Option<T> {
        validate_key(name).ok()?;
        let path = self.layout.document_path(name);

        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                trace!("No cached document {}", name);
                return None;
            }
            Err(e) => {
                warn!("Failed to read document {}: {}", path.display(), e);
                return None;
            }
        };

        match serde_json::from_str(&content) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Corrupt document {}: {}", path.display(), e);
                None
            }
        }
    }

    async fn store_locked(
        &self,
        key: &str,
        namespace: Namespace,
        source: &Path,
        metadata: ArtifactMetadata,
    ) -> CacheResult<ArtifactRecord> {
        validate_key(key)?;

        match fs::metadata(source).await {
            Ok(m) if m.is_file() => {}
            Ok(_) => {
                return Err(CacheError::store_failed(
                    key,
                    namespace,
                    format!("{} is not a regular file", source.display()),
                ))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                error!("Source file does not exist: {}", source.display());
                return Err(CacheError::SourceMissing(source.to_path_buf()));
            }
            Err(e) => {
                return Err(CacheError::io(
                    format!("inspecting source {}", source.display()),
                    e,
                ))
            }
        }

        info!(
            "Storing {} cache for {} from {}",
            namespace,
            key,
            source.display()
        );

        let format = source
            .extension()
            .and_then(|ext| ext.to_str())
            .filter(|ext| !ext.is_empty())
            .unwrap_or(namespace.default_format())
            .to_string();
        let plan = WritePlan {
            key,
            namespace,
            source,
            staging: self.layout.staging_path(namespace, key, &format),
            final_path: self.layout.final_path(namespace, key, &format),
            format,
        };

        let guard = self
            .lock_for(self.layout.lock_path(namespace, key))
            .acquire()
            .await?;
        debug!("Acquired {} lock for {}", namespace, key);

        let previous = self.read_sidecar(namespace, key).await.ok().flatten();
        let mut promoted = false;

        let outcome = match self.write_entry(&plan, metadata, &mut promoted).await {
            Ok(record) => {
                if let Some(previous) = previous
                    .filter(|p| p.has_plain_file_name() && p.file_name != plan.file_name())
                {
                    let superseded = self.layout.namespace_dir(namespace).join(&previous.file_name);
                    if let Err(e) = remove_if_present(&superseded).await {
                        warn!("Failed to remove superseded artifact: {}", e);
                    }
                }

                info!(
                    "Cached {} for {}: {} bytes, checksum {}...",
                    namespace,
                    key,
                    record.file_size,
                    &record.checksum[..8]
                );
                Ok(record)
            }
            Err(cause) => {
                let replaced_previous = previous
                    .as_ref()
                    .is_some_and(|p| p.file_name == plan.file_name());
                let failures = self.roll_back(&plan, promoted, replaced_previous).await;

                let mut reason = describe(&cause);
                if !failures.is_empty() {
                    reason.push_str("; cleanup also failed: ");
                    reason.push_str(&failures.join("; "));
                }
                error!("Failed to store {} cache for {}: {}", namespace, key, reason);
                Err(CacheError::store_failed(key, namespace, reason))
            }
        };

        if let Err(e) = guard.release() {
            warn!("Failed to release {} lock for {}: {}", namespace, key, e);
        }
        outcome
    }

    /// Steps 1-5 of a store; sets `promoted` once the final path was replaced
    async fn write_entry(
        &self,
        plan: &WritePlan<'_>,
        metadata: ArtifactMetadata,
        promoted: &mut bool,
    ) -> CacheResult<ArtifactRecord> {
        trace!(
            "Copying {} to staging {}",
            plan.source.display(),
            plan.staging.display()
        );
        fs::copy(plan.source, &plan.staging).await.map_err(|e| {
            CacheError::io(
                format!(
                    "copying {} to {}",
                    plan.source.display(),
                    plan.staging.display()
                ),
                e,
            )
        })?;

        let expected = file_len(plan.source).await?;
        let actual = file_len(&plan.staging).await?;
        if expected != actual {
            return Err(CacheError::CopyVerification {
                path: plan.staging.clone(),
                expected,
                actual,
            });
        }

        trace!(
            "Promoting {} to {}",
            plan.staging.display(),
            plan.final_path.display()
        );
        fs::rename(&plan.staging, &plan.final_path)
            .await
            .map_err(|e| {
                CacheError::io(format!("promoting {}", plan.final_path.display()), e)
            })?;
        *promoted = true;

        let file_size = file_len(&plan.final_path).await?;
        let checksum = sha256_file(&plan.final_path).await?;

        let sidecar = Sidecar {
            key: plan.key.to_string(),
            namespace: plan.namespace,
            file_name: plan.file_name(),
            file_size,
            checksum,
            format: plan.format.clone(),
            cached_at: Utc::now(),
            metadata,
        };
        let json = serde_json::to_vec_pretty(&sidecar)?;
        write_atomic(
            &self.layout.sidecar_path(plan.namespace, plan.key),
            &self.layout.metadata_staging_dir(),
            &json,
        )
        .await?;

        Ok(sidecar.into_record(plan.final_path.clone()))
    }

    /// Undo a failed store; returns the cleanup steps that failed
    async fn roll_back(
        &self,
        plan: &WritePlan<'_>,
        promoted: bool,
        replaced_previous: bool,
    ) -> Vec<String> {
        let mut targets = vec![plan.staging.clone()];
        if promoted {
            targets.push(plan.final_path.clone());
            // the old sidecar now describes bytes that no longer exist
            if replaced_previous {
                targets.push(self.layout.sidecar_path(plan.namespace, plan.key));
            }
        }

        let mut failures = Vec::new();
        for target in targets {
            match remove_if_present(&target).await {
                Ok(true) => trace!("Rolled back {}", target.display()),
                Ok(false) => {}
                Err(e) => failures.push(e),
            }
        }
        failures
    }

    /// Read-side checks shared by `is_cached` and `retrieve`
    async fn locate(&self, key: &str, namespace: Namespace) -> Option<Located> {
        if self.options.forced.contains(&namespace) {
            debug!("Forcing {} for {}, ignoring cache", namespace, key);
            return None;
        }
        validate_key(key).ok()?;

        let sidecar = match self.read_sidecar(namespace, key).await {
            Ok(sidecar) => sidecar,
            Err(e) => {
                warn!("Unusable metadata for {} {}: {}", namespace, key, e);
                return None;
            }
        };

        let path = match &sidecar {
            Some(s) => {
                if s.key != key || s.namespace != namespace || !s.has_plain_file_name() {
                    warn!(
                        "Metadata for {} {} describes a different entry",
                        namespace, key
                    );
                    return None;
                }
                self.layout.namespace_dir(namespace).join(&s.file_name)
            }
            None => self.find_artifact(namespace, key).await?,
        };

        let on_disk = match fs::metadata(&path).await {
            Ok(m) if m.is_file() => m,
            _ => {
                trace!("No {} cache found for {}", namespace, key);
                return None;
            }
        };

        let staging_marker = self.layout.staging_dir(namespace).join(path.file_name()?);
        let lock = self.layout.lock_path(namespace, key);
        if fs::try_exists(&staging_marker).await.unwrap_or(true)
            || fs::try_exists(&lock).await.unwrap_or(true)
        {
            debug!(
                "{} for {} is in progress or locked, treating as not cached",
                namespace, key
            );
            return None;
        }

        if let Some(s) = &sidecar {
            if on_disk.len() != s.file_size {
                warn!(
                    "{} cache size mismatch for {}: expected {}, actual {}",
                    namespace,
                    key,
                    s.file_size,
                    on_disk.len()
                );
                return None;
            }
        }

        Some(Located { path, sidecar })
    }

    pub(super) async fn read_sidecar(
        &self,
        namespace: Namespace,
        key: &str,
    ) -> CacheResult<Option<Sidecar>> {
        let path = self.layout.sidecar_path(namespace, key);
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(CacheError::io(
                    format!("reading metadata {}", path.display()),
                    e,
                ))
            }
        };
        Ok(Some(serde_json::from_str(&content)?))
    }

    /// Find an entry's file without a sidecar to name it
    async fn find_artifact(&self, namespace: Namespace, key: &str) -> Option<PathBuf> {
        let dir = self.layout.namespace_dir(namespace);
        let mut entries = fs::read_dir(&dir).await.ok()?;
        let mut matches = Vec::new();

        while let Ok(Some(entry)) = entries.next_entry().await {
            if let Some(name) = entry.file_name().to_str() {
                if names_artifact(name, key) {
                    matches.push(entry.path());
                }
            }
        }

        matches.sort();
        matches.into_iter().next()
    }

    fn lock_for(&self, path: PathBuf) -> RetryableLock {
        RetryableLock::new(path)
            .timeout(self.options.lock_timeout)
            .max_retries(self.options.lock_retries)
            .retry_delay(self.options.retry_delay)
            .stale_after(self.options.stale_after)
            .probe(Arc::clone(&self.options.probe))
    }
}

async fn file_len(path: &Path) -> CacheResult<u64> {
    fs::metadata(path)
        .await
        .map(|m| m.len())
        .map_err(|e| CacheError::io(format!("inspecting {}", path.display()), e))
}

/// Remove a file; `Ok(false)` when it did not exist
async fn remove_if_present(path: &Path) -> Result<bool, String> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(format!("removing {}: {}", path.display(), e)),
    }
}

/// Render an error with its source chain
fn describe(err: &(dyn std::error::Error + 'static)) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        text.push_str(": ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    text
}
