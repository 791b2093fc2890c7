//! Lifecycle Scenario Tests
//!
//! End-to-end flows against the real filesystem adapter

use jobspace_core::application::ReclamationScheduler;
use jobspace_core::error::AppError;
use jobspace_core::port::time_provider::mocks::ManualClock;
use jobspace_core::port::TimestampIdProvider;
use jobspace_core::{LifecycleConfig, LifecycleManager};
use jobspace_infra_fs::FsJobStorage;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

// 2024-03-15T14:03:59Z
const T0: i64 = 1_710_511_439_000;
const EXPIRY: Duration = Duration::from_secs(30 * 60);

struct Env {
    _tmp: TempDir,
    project_root: std::path::PathBuf,
    manager: Arc<LifecycleManager>,
    clock: Arc<ManualClock>,
}

impl Env {
    fn temp_root(&self) -> std::path::PathBuf {
        self.manager.config().temp_root()
    }

    fn scheduler(&self) -> ReclamationScheduler {
        ReclamationScheduler::new(self.manager.clone(), self.clock.clone())
    }
}

async fn setup() -> Env {
    let tmp = tempfile::tempdir().unwrap();
    let project_root = tmp.path().to_path_buf();
    let clock = Arc::new(ManualClock::new(T0));
    let config = LifecycleConfig {
        project_root: project_root.clone(),
        ..Default::default()
    };
    let manager = Arc::new(
        LifecycleManager::new(
            config,
            Arc::new(FsJobStorage::new()),
            Arc::new(TimestampIdProvider::new(clock.clone())),
            clock.clone(),
        )
        .unwrap(),
    );
    manager.startup_sweep().await.unwrap();
    Env {
        _tmp: tmp,
        project_root,
        manager,
        clock,
    }
}

/// Bytes of all regular files below `dir`
fn disk_usage(dir: &Path) -> u64 {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return 0;
    };
    entries
        .map(|e| e.unwrap())
        .map(|e| {
            let meta = e.metadata().unwrap();
            if meta.is_dir() {
                disk_usage(&e.path())
            } else {
                meta.len()
            }
        })
        .sum()
}

fn entry_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

/// Scenario 1: bind → save twice → info/stats → expire → one cycle → empty
#[tokio::test]
async fn test_end_to_end_job_lifecycle() {
    let env = setup().await;

    let j1 = env.manager.bind_session("s1").await.unwrap();
    assert!(j1.as_str().starts_with("job_20240315_14h03m59s_"));

    env.manager
        .save_entity_file(&j1, "gene", "genes.csv", &[b'a'; 100])
        .await
        .unwrap();
    let path = env
        .manager
        .save_entity_file(&j1, "gene", "genes.csv", &[b'b'; 50])
        .await
        .unwrap();

    let info = env.manager.get_job_info(&j1).await.unwrap();
    assert_eq!(info.entity_files.len(), 1);
    assert_eq!(info.entity_files[0].label, "gene");
    assert_eq!(info.entity_files[0].size, 50);
    assert_eq!(std::fs::read(&path).unwrap(), vec![b'b'; 50]);

    let stats = env.manager.get_stats().await;
    assert_eq!(stats.total_jobs, 1);
    assert_eq!(stats.total_files, 1);
    assert_eq!(stats.total_size_bytes, 50);

    env.clock.advance(EXPIRY + Duration::from_secs(1));
    let report = env.scheduler().run_cycle().await;
    assert_eq!(report.reclaimed, 1);

    let stats = env.manager.get_stats().await;
    assert_eq!(stats.total_jobs, 0);
    assert!(!info.dir.exists());
    assert!(entry_names(&env.temp_root()).is_empty());

    println!("✅ End-to-end lifecycle: last write wins, job reclaimed after expiry");
}

/// Scenario 2: deleting twice returns true then false and restores disk usage
#[tokio::test]
async fn test_idempotent_delete_restores_disk_usage() {
    let env = setup().await;
    let job = env.manager.create_job().await.unwrap();
    let dir = env.manager.get_job_info(&job).await.unwrap().dir;
    let before = disk_usage(&dir);

    env.manager
        .save_entity_file(&job, "drug", "drugs.tsv", &[7u8; 2048])
        .await
        .unwrap();
    assert_eq!(disk_usage(&dir), before + 2048);

    assert!(env.manager.delete_uploaded_file(&job, "drug").await.unwrap());
    assert!(!env.manager.delete_uploaded_file(&job, "drug").await.unwrap());
    assert_eq!(disk_usage(&dir), before);

    println!("✅ Idempotent delete: true, then false, usage restored");
}

/// Scenario 3: replacing an entity with another extension leaves no stale file
#[tokio::test]
async fn test_format_change_leaves_single_file() {
    let env = setup().await;
    let job = env.manager.create_job().await.unwrap();
    let dir = env.manager.get_job_info(&job).await.unwrap().dir;

    env.manager
        .save_entity_file(&job, "protein", "p.csv", b"a,b\n")
        .await
        .unwrap();
    env.manager
        .save_entity_file(&job, "protein", "p.TSV", b"a\tb\n")
        .await
        .unwrap();
    env.manager
        .save_label_file(&job, b"id,label\n", "labels.csv")
        .await
        .unwrap();

    assert_eq!(entry_names(&dir), vec!["labels.csv", "protein.tsv"]);

    println!("✅ Format change: stale file removed");
}

/// Scenario 4: same token → same job; after reclamation → new job
#[tokio::test]
async fn test_session_rebinding_after_reclamation() {
    let env = setup().await;

    let first = env.manager.bind_session("browser-tab-1").await.unwrap();
    env.clock.advance(Duration::from_secs(60));
    assert_eq!(
        env.manager.bind_session("browser-tab-1").await.unwrap(),
        first
    );

    env.clock.advance(EXPIRY + Duration::from_secs(1));
    let report = env.scheduler().run_cycle().await;
    assert_eq!(report.reclaimed, 1);
    assert_eq!(report.sessions_pruned, 1);

    let second = env.manager.bind_session("browser-tab-1").await.unwrap();
    assert_ne!(first, second);
    assert!(matches!(
        env.manager.get_job_info(&first).await,
        Err(AppError::NotFound(_))
    ));

    println!("✅ Session rebinding: reclaimed job replaced by a fresh one");
}

/// Scenario 5: startup sweep removes leftover job dirs, nothing else
#[tokio::test]
async fn test_startup_sweep_purges_leftovers_only() {
    let env = setup().await;
    let temp_root = env.temp_root();

    let leftover = temp_root.join("job_20240101_09h00m00s_abc123");
    std::fs::create_dir_all(leftover.join("data_output")).unwrap();
    std::fs::write(leftover.join("gene.csv"), b"stale").unwrap();
    let unrelated = temp_root.join("notes");
    std::fs::create_dir_all(&unrelated).unwrap();
    let cache = env.project_root.join("cache").join("processed_data");
    std::fs::create_dir_all(&cache).unwrap();
    std::fs::write(cache.join("result.csv"), b"keep").unwrap();

    let report = env.manager.startup_sweep().await.unwrap();

    assert_eq!(report.orphans_removed, 1);
    assert!(report.is_clean());
    assert!(!leftover.exists());
    assert!(unrelated.exists());
    assert_eq!(std::fs::read(cache.join("result.csv")).unwrap(), b"keep");

    println!("✅ Startup sweep: leftovers purged, cache untouched");
}

/// Scenario 6: output dir goes away with its job
#[tokio::test]
async fn test_output_dir_removed_with_job() {
    let env = setup().await;
    let job = env.manager.create_job().await.unwrap();

    let out = env.manager.output_dir(&job).await.unwrap();
    std::fs::write(out.join("embedding.npy"), [0u8; 16]).unwrap();

    env.manager.registry().remove_job(&job, false).await.unwrap();
    assert!(!out.exists());

    println!("✅ Output dir: deleted with the job");
}

/// Scenario 7: shutdown sweep empties the temp root
#[tokio::test]
async fn test_shutdown_sweep_empties_temp_root() {
    let env = setup().await;
    for token in ["a", "b", "c"] {
        let job = env.manager.bind_session(token).await.unwrap();
        env.manager
            .save_entity_file(&job, "gene", "g.txt", token.as_bytes())
            .await
            .unwrap();
    }

    let report = env.manager.shutdown_sweep().await.unwrap();

    assert_eq!(report.removed, 3);
    assert!(env.manager.registry().is_empty());
    assert!(entry_names(&env.temp_root()).is_empty());

    println!("✅ Shutdown sweep: temp root empty");
}
