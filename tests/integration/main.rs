//! Integration tests for dvdcache

use assert_cmd::{cargo::cargo_bin_cmd, Command};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A cache root plus an isolated (absent) config file
struct Sandbox {
    temp: TempDir,
}

impl Sandbox {
    fn new() -> Self {
        Self {
            temp: TempDir::new().unwrap(),
        }
    }

    fn cache_dir(&self) -> PathBuf {
        self.temp.path().join("cache")
    }

    fn config_path(&self) -> PathBuf {
        self.temp.path().join("config.toml")
    }

    fn cmd(&self) -> Command {
        let mut cmd = cargo_bin_cmd!("dvdcache");
        cmd.env("DVDCACHE_CONFIG", self.config_path())
            .env("DVDCACHE_CACHE_DIR", self.cache_dir())
            .env_remove("RUST_LOG");
        cmd
    }

    fn file(&self, name: &str, bytes: &[u8]) -> PathBuf {
        let path = self.temp.path().join(name);
        std::fs::write(&path, bytes).unwrap();
        path
    }
}

fn store(sandbox: &Sandbox, key: &str, namespace: &str, source: &Path) {
    sandbox
        .cmd()
        .args(["store", key])
        .arg(source)
        .args(["--namespace", namespace])
        .assert()
        .success();
}

mod cli_tests {
    use super::*;
    use predicates::prelude::*;

    #[test]
    fn help_displays() {
        Sandbox::new()
            .cmd()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("disc capacity planner for DVD media pipelines"));
    }

    #[test]
    fn version_displays() {
        Sandbox::new()
            .cmd()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("dvdcache"));
    }

    #[test]
    fn config_path_follows_flag() {
        let sandbox = Sandbox::new();
        sandbox
            .cmd()
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_init_then_show() {
        let sandbox = Sandbox::new();
        sandbox
            .cmd()
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Configuration initialized"));
        assert!(sandbox.config_path().exists());

        sandbox
            .cmd()
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("already exists"));

        sandbox
            .cmd()
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[cache]"))
            .stdout(predicate::str::contains("budget_gib = 4.7"));
    }

    #[test]
    fn invalid_config_reports_hint() {
        let sandbox = Sandbox::new();
        std::fs::write(sandbox.config_path(), "[lock]\ntimeout_secs = \"soon\"\n").unwrap();

        sandbox
            .cmd()
            .arg("stats")
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid configuration"))
            .stderr(predicate::str::contains("Hint:"));

        // init --force recovers from a broken file
        sandbox
            .cmd()
            .args(["config", "init", "--force"])
            .assert()
            .success();
        sandbox.cmd().arg("stats").assert().success();
    }

    #[test]
    fn store_get_check_roundtrip() {
        let sandbox = Sandbox::new();
        let data = vec![7u8; 64 * 1024];
        let source = sandbox.file("dQw4w9WgXcQ.mp4", &data);

        sandbox
            .cmd()
            .args(["store", "dQw4w9WgXcQ"])
            .arg(&source)
            .args(["--title", "Intro"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Cached downloads/dQw4w9WgXcQ"));

        let expected_path = sandbox.cache_dir().join("downloads").join("dQw4w9WgXcQ.mp4");
        assert_eq!(std::fs::read(&expected_path).unwrap(), data);

        sandbox
            .cmd()
            .args(["get", "dQw4w9WgXcQ", "--format", "plain"])
            .assert()
            .success()
            .stdout(predicate::str::contains(expected_path.to_string_lossy().as_ref()));

        let output = sandbox
            .cmd()
            .args(["get", "dQw4w9WgXcQ", "--format", "json"])
            .output()
            .unwrap();
        assert!(output.status.success());
        let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(
            json["checksum"],
            dvdcache::cache::integrity::sha256_bytes(&data)
        );
        assert_eq!(json["file_size"], 64 * 1024);
        assert_eq!(json["metadata"]["title"], "Intro");

        sandbox
            .cmd()
            .args(["check", "dQw4w9WgXcQ"])
            .assert()
            .success();
        sandbox
            .cmd()
            .args(["check", "dQw4w9WgXcQ", "--namespace", "converted"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("not cached"));
    }

    #[test]
    fn missing_source_fails() {
        let sandbox = Sandbox::new();
        sandbox
            .cmd()
            .args(["store", "v1", "/nonexistent/video.mp4"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Source file does not exist"));
    }

    #[test]
    fn invalid_key_fails() {
        let sandbox = Sandbox::new();
        let source = sandbox.file("a.mp4", b"x");
        sandbox
            .cmd()
            .args(["store", "../escape"])
            .arg(&source)
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid cache key"));
    }

    #[test]
    fn corrupt_sidecar_is_a_miss() {
        let sandbox = Sandbox::new();
        let source = sandbox.file("v1.mp4", b"video");
        store(&sandbox, "v1", "downloads", &source);

        std::fs::write(
            sandbox.cache_dir().join("metadata").join("downloads-v1.json"),
            "{ truncated",
        )
        .unwrap();

        sandbox.cmd().args(["get", "v1"]).assert().failure();
        sandbox.cmd().args(["check", "v1", "-q"]).assert().failure();
    }

    #[test]
    fn forced_namespace_reads_as_missing() {
        let sandbox = Sandbox::new();
        let source = sandbox.file("v1.mp4", b"video");
        store(&sandbox, "v1", "downloads", &source);
        store(&sandbox, "v1", "converted", &source);

        sandbox
            .cmd()
            .args(["check", "v1", "-q", "--force-download"])
            .assert()
            .failure();
        sandbox
            .cmd()
            .args(["get", "v1", "-n", "converted", "--force-download"])
            .assert()
            .success();

        std::fs::write(
            sandbox.config_path(),
            "[cache]\nforce_convert = true\n",
        )
        .unwrap();
        sandbox
            .cmd()
            .args(["check", "v1", "-q", "-n", "converted"])
            .assert()
            .failure();
        sandbox.cmd().args(["check", "v1", "-q"]).assert().success();
    }

    #[test]
    fn stale_lock_from_dead_process_is_reclaimed() {
        let sandbox = Sandbox::new();
        let source = sandbox.file("v1.mp4", b"video");
        let locks = sandbox.cache_dir().join(".locks");
        std::fs::create_dir_all(&locks).unwrap();

        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs_f64();
        // pid beyond pid_t range never names a live process
        std::fs::write(
            locks.join("downloads-v1.lock"),
            format!("{}\n{}\n", u32::MAX - 1, now),
        )
        .unwrap();

        store(&sandbox, "v1", "downloads", &source);
        assert!(!locks.join("downloads-v1.lock").exists());
        sandbox.cmd().args(["check", "v1"]).assert().success();
    }

    #[test]
    fn aged_lock_is_reclaimed() {
        let sandbox = Sandbox::new();
        let source = sandbox.file("v1.mpg", b"program stream");
        let locks = sandbox.cache_dir().join(".locks");
        std::fs::create_dir_all(&locks).unwrap();

        // live holder, but acquired long before the staleness threshold
        std::fs::write(
            locks.join("converted-v1.lock"),
            format!("{}\n{}\n", std::process::id(), 1_000_000.0),
        )
        .unwrap();

        store(&sandbox, "v1", "converted", &source);
        sandbox
            .cmd()
            .args(["check", "v1", "--namespace", "converted"])
            .assert()
            .success();
    }

    #[test]
    fn stats_reports_directories() {
        let sandbox = Sandbox::new();
        let source = sandbox.file("v1.mp4", &[1u8; 2048]);
        store(&sandbox, "v1", "downloads", &source);

        let output = sandbox
            .cmd()
            .args(["stats", "--format", "json"])
            .output()
            .unwrap();
        assert!(output.status.success());

        let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        let downloads = json["dirs"]
            .as_array()
            .unwrap()
            .iter()
            .find(|d| d["name"] == "downloads")
            .unwrap()
            .clone();
        assert_eq!(downloads["files"], 1);
        assert_eq!(downloads["bytes"], 2048);
        assert_eq!(json["total_files"], 2);
    }

    #[test]
    fn clear_removes_namespace() {
        let sandbox = Sandbox::new();
        let source = sandbox.file("v1.mp4", b"video");
        store(&sandbox, "v1", "downloads", &source);
        store(&sandbox, "v1", "converted", &source);

        sandbox
            .cmd()
            .args(["clear", "downloads", "--dry-run"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Dry run"));
        sandbox.cmd().args(["check", "v1"]).assert().success();

        sandbox
            .cmd()
            .args(["clear", "downloads", "--yes"])
            .assert()
            .success()
            .stdout(predicate::str::contains("cleared 2 file(s)"));

        sandbox.cmd().args(["check", "v1"]).assert().failure();
        sandbox
            .cmd()
            .args(["check", "v1", "--namespace", "converted"])
            .assert()
            .success();
    }

    #[test]
    fn gc_respects_age() {
        let sandbox = Sandbox::new();
        let source = sandbox.file("v1.mp4", b"video");
        store(&sandbox, "v1", "downloads", &source);

        sandbox
            .cmd()
            .args(["gc", "--days", "0"])
            .assert()
            .success()
            .stdout(predicate::str::contains("disabled"));

        sandbox
            .cmd()
            .args(["gc", "--days", "7"])
            .assert()
            .success()
            .stdout(predicate::str::contains("No cached files older than 7 days"));

        let artifact = sandbox.cache_dir().join("downloads").join("v1.mp4");
        let old = std::time::SystemTime::now() - std::time::Duration::from_secs(10 * 86_400);
        std::fs::File::options()
            .write(true)
            .open(&artifact)
            .unwrap()
            .set_modified(old)
            .unwrap();

        sandbox
            .cmd()
            .args(["gc", "--days", "7", "--dry-run"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Would remove 1 file(s)"));
        assert!(artifact.exists());

        sandbox.cmd().args(["gc", "--days", "7"]).assert().success();
        assert!(!artifact.exists());
    }

    #[test]
    fn fit_selects_in_order() {
        let sandbox = Sandbox::new();
        for (key, size) in [("a", 400usize), ("b", 400), ("c", 2000)] {
            let source = sandbox.file(&format!("{key}.mpg"), &vec![0u8; size]);
            store(&sandbox, key, "converted", &source);
        }

        // about 1073 bytes
        let output = sandbox
            .cmd()
            .args(["fit", "a", "b", "c", "zz", "--budget-gib", "0.000001", "--format", "json"])
            .output()
            .unwrap();
        assert!(output.status.success());

        let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        let keys = |field: &str| -> Vec<String> {
            json[field]
                .as_array()
                .unwrap()
                .iter()
                .map(|r| r["key"].as_str().unwrap().to_string())
                .collect()
        };
        assert_eq!(keys("included"), vec!["a", "b"]);
        assert_eq!(keys("excluded"), vec!["c"]);
        assert_eq!(json["missing"], serde_json::json!(["zz"]));
        assert_eq!(json["included_bytes"], 800);
        assert_eq!(json["excluded_bytes"], 2000);
    }
}

mod concurrency_tests {
    use super::*;
    use dvdcache::cache::{ArtifactMetadata, ArtifactStore, Namespace, StoreOptions};
    use std::process::Stdio;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_stores_of_one_key_stay_consistent() {
        let sandbox = Sandbox::new();
        let store = ArtifactStore::open(sandbox.cache_dir(), StoreOptions::default())
            .await
            .unwrap();

        let mut tasks = Vec::new();
        for i in 0..8u8 {
            let source = sandbox.file(&format!("src-{i}.mp4"), &vec![i; 256 * 1024]);
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                store
                    .store("shared", Namespace::Downloads, &source, ArtifactMetadata::default())
                    .await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let record = store.retrieve("shared", Namespace::Downloads).await.unwrap();
        let bytes = std::fs::read(&record.file_path).unwrap();
        assert_eq!(bytes.len(), 256 * 1024);
        assert!(bytes.iter().all(|b| *b == bytes[0]), "interleaved writes");
        assert_eq!(
            record.checksum,
            dvdcache::cache::integrity::sha256_bytes(&bytes)
        );

        let locks = std::fs::read_dir(sandbox.cache_dir().join(".locks")).unwrap().count();
        assert_eq!(locks, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn readers_never_see_partial_entries() {
        let sandbox = Sandbox::new();
        let store = ArtifactStore::open(sandbox.cache_dir(), StoreOptions::default())
            .await
            .unwrap();

        const MIB: usize = 1024 * 1024;
        let contents: Vec<Vec<u8>> = [1usize, 3, 5]
            .iter()
            .enumerate()
            .map(|(i, mib)| vec![i as u8 + 1; mib * MIB])
            .collect();
        let sizes: Vec<u64> = contents.iter().map(|c| c.len() as u64).collect();
        let checksums: Vec<String> = contents
            .iter()
            .map(|c| dvdcache::cache::integrity::sha256_bytes(c))
            .collect();
        let sources: Vec<PathBuf> = contents
            .iter()
            .enumerate()
            .map(|(i, bytes)| sandbox.file(&format!("r-{i}.mp4"), bytes))
            .collect();

        let writer = {
            let store = store.clone();
            tokio::spawn(async move {
                for source in sources.iter().cycle().take(15) {
                    store
                        .store("polled", Namespace::Downloads, source, ArtifactMetadata::default())
                        .await
                        .unwrap();
                }
            })
        };

        let final_path = sandbox.cache_dir().join("downloads").join("polled.mp4");
        let mut observed = 0usize;
        while !writer.is_finished() {
            // the final path is stat'ed directly, bypassing the store's checks
            if let Ok(meta) = std::fs::metadata(&final_path) {
                assert!(
                    sizes.contains(&meta.len()),
                    "final file has partial size {}",
                    meta.len()
                );
                observed += 1;
            }
            if let Some(record) = store.retrieve("polled", Namespace::Downloads).await {
                assert!(checksums.contains(&record.checksum));
                assert!(sizes.contains(&record.file_size));
            }
            tokio::task::yield_now().await;
        }
        writer.await.unwrap();

        assert!(observed > 0);
        let record = store.retrieve("polled", Namespace::Downloads).await.unwrap();
        assert_eq!(record.checksum, checksums[(15 - 1) % 3]);
    }

    #[test]
    fn concurrent_processes_share_one_cache() {
        let sandbox = Sandbox::new();
        let children: Vec<_> = (0..4u8)
            .map(|i| {
                let source = sandbox.file(&format!("p-{i}.mpg"), &vec![i; 512 * 1024]);
                std::process::Command::new(env!("CARGO_BIN_EXE_dvdcache"))
                    .env("DVDCACHE_CONFIG", sandbox.config_path())
                    .env("DVDCACHE_CACHE_DIR", sandbox.cache_dir())
                    .args(["store", "same", "--namespace", "converted", "--format", "plain"])
                    .arg(&source)
                    .stdout(Stdio::null())
                    .stderr(Stdio::null())
                    .spawn()
                    .unwrap()
            })
            .collect();

        for mut child in children {
            assert!(child.wait().unwrap().success());
        }

        sandbox
            .cmd()
            .args(["get", "same", "--namespace", "converted"])
            .assert()
            .success();
    }
}
