//! Checksums and atomic writes

use crate::error::{CacheError, CacheResult};
use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::trace;
use uuid::Uuid;

const CHUNK_SIZE: usize = 64 * 1024;

/// SHA-256 of a file's contents as lowercase hex, read in chunks
pub async fn sha256_file(path: &Path) -> CacheResult<String> {
    trace!("Calculating checksum for {}", path.display());

    let mut file = fs::File::open(path)
        .await
        .map_err(|e| CacheError::io(format!("opening {} for checksum", path.display()), e))?;

    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let n = file
            .read(&mut buf)
            .await
            .map_err(|e| CacheError::io(format!("reading {} for checksum", path.display()), e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// SHA-256 of an in-memory buffer as lowercase hex
pub fn sha256_bytes(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Write `bytes` to `path` through a temporary file in `staging_dir`
///
/// The temporary is renamed over the destination, so readers see either the
/// previous contents or the new ones. `staging_dir` must be on the same
/// filesystem as `path`.
pub async fn write_atomic(path: &Path, staging_dir: &Path, bytes: &[u8]) -> CacheResult<()> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("file");
    let tmp = staging_dir.join(format!("{}.{}.tmp", file_name, Uuid::new_v4()));

    let result = async {
        let mut file = fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(&tmp, path).await
    }
    .await;

    if let Err(e) = result {
        let _ = fs::remove_file(&tmp).await;
        return Err(CacheError::io(
            format!("writing {} atomically", path.display()),
            e,
        ));
    }

    trace!("Atomically wrote {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn sha256_known_vector() {
        assert_eq!(
            sha256_bytes(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[tokio::test]
    async fn file_checksum_matches_buffer_checksum() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("blob.bin");
        // spans several read chunks
        let data: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        std::fs::write(&path, &data).unwrap();

        assert_eq!(sha256_file(&path).await.unwrap(), sha256_bytes(&data));
    }

    #[tokio::test]
    async fn checksum_of_missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let err = sha256_file(&dir.path().join("nope")).await.unwrap_err();
        assert!(matches!(err, CacheError::Io { .. }));
    }

    #[tokio::test]
    async fn atomic_write_replaces_and_leaves_no_temporaries() {
        let dir = TempDir::new().unwrap();
        let staging = dir.path().join(".in-progress");
        std::fs::create_dir(&staging).unwrap();
        let path = dir.path().join("doc.json");

        write_atomic(&path, &staging, b"{\"v\":1}").await.unwrap();
        write_atomic(&path, &staging, b"{\"v\":2}").await.unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{\"v\":2}");
        assert_eq!(std::fs::read_dir(&staging).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn failed_atomic_write_cleans_temporary() {
        let dir = TempDir::new().unwrap();
        let staging = dir.path().join(".in-progress");
        std::fs::create_dir(&staging).unwrap();
        // a non-empty directory cannot be replaced by a file rename
        let path = dir.path().join("occupied");
        std::fs::create_dir(&path).unwrap();
        std::fs::write(path.join("child"), b"x").unwrap();

        assert!(write_atomic(&path, &staging, b"data").await.is_err());
        assert_eq!(std::fs::read_dir(&staging).unwrap().count(), 0);
    }
}
