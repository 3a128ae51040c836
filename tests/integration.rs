use std::sync::Arc;
use std::time::Duration;

use skillhub_backfill::{Blake3FileHasher, FileDigest, FileHasher};
use skillhub_core::bootstrap::{Jobs, Stores, build_scheduler, build_service};
use skillhub_core::config::{BlobBackend, Config, ScheduledTaskConfig};
use skillhub_core::{Identity, Role, RunRequest, ScheduleRequest, ServiceError};
use skillhub_scheduler::{JobQueue, JobStatus};
use skillhub_store::{
    FsBlobStore, NewSkillVersion, ParsedMetadata, RegistryStore, SkillFile, SqliteStore,
};
use tokio::sync::watch;

const README: &str = "---\nname: weather\ndescription: Current weather and forecasts.\nmetadata: {\"clawdis\":{\"emoji\":\"sun\"}}\n---\n# Weather\n\nCall the API.\n";

fn config_in(dir: &tempfile::TempDir) -> Config {
    let mut config = Config::default();
    config.store.sqlite_path = dir.path().join("registry.db").to_string_lossy().into_owned();
    config
}

fn file(path: &str, sha256: &str, storage_id: &str) -> SkillFile {
    SkillFile {
        path: path.into(),
        size: 10,
        sha256: sha256.into(),
        storage_id: storage_id.into(),
    }
}

/// Publish a skill whose latest version has a README stored under `readme_id`.
async fn publish(store: &SqliteStore, slug: &str, readme_id: &str) -> (i64, i64) {
    let skill_id = store.insert_skill(slug, None).await.unwrap();
    let version_id = store
        .insert_version(
            skill_id,
            &NewSkillVersion {
                version: "1.0.0".into(),
                files: vec![file("SKILL.md", "a", readme_id), file("x.ts", "b", "st_x")],
                ..NewSkillVersion::default()
            },
        )
        .await
        .unwrap();
    store
        .set_latest_version(skill_id, Some(version_id))
        .await
        .unwrap();
    (skill_id, version_id)
}

fn admin() -> Identity {
    Identity::new("ops", Role::Admin)
}

#[tokio::test]
async fn summary_backfill_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(&dir);
    let stores = Stores::open(&config.store).await.unwrap();
    let jobs = Jobs::new(&stores);
    let service = build_service(&config, &jobs, JobQueue::new(stores.jobs.clone()));

    let (skill_id, version_id) = publish(&stores.registry, "weather", "st_readme").await;
    stores
        .registry
        .put_blob("st_readme", README.as_bytes(), Some("text/markdown"))
        .await
        .unwrap();
    publish(&stores.registry, "no-blob", "st_missing").await;
    stores.registry.insert_skill("draft", None).await.unwrap();

    let dry = service
        .run_summary_backfill(
            Some(&admin()),
            RunRequest {
                dry_run: Some(true),
                ..RunRequest::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(dry.stats.skills_scanned, 3);
    assert_eq!(dry.stats.skills_patched, 1);
    assert_eq!(dry.stats.versions_patched, 1);
    assert_eq!(dry.stats.missing_storage_blob, 1);
    assert_eq!(dry.stats.missing_latest_version, 1);
    assert!(stores.registry.get_skill(skill_id).await.unwrap().unwrap().summary.is_none());

    let real = service
        .run_summary_backfill(Some(&admin()), RunRequest::default())
        .await
        .unwrap();
    assert_eq!(real.stats, dry.stats);

    let skill = stores.registry.get_skill(skill_id).await.unwrap().unwrap();
    assert_eq!(skill.summary.as_deref(), Some("Current weather and forecasts."));
    let version = stores.registry.get_version(version_id).await.unwrap().unwrap();
    assert_eq!(version.parsed.frontmatter["name"], "weather");
    assert_eq!(version.parsed.clawdis, Some(serde_json::json!({"emoji": "sun"})));

    let again = service
        .run_summary_backfill(Some(&admin()), RunRequest::default())
        .await
        .unwrap();
    assert_eq!(again.stats.skills_patched, 0);
    assert_eq!(again.stats.versions_patched, 0);
}

#[tokio::test]
async fn fingerprint_backfill_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(&dir);
    let stores = Stores::open(&config.store).await.unwrap();
    let jobs = Jobs::new(&stores);
    let service = build_service(&config, &jobs, JobQueue::new(stores.jobs.clone()));

    let (_, version_id) = publish(&stores.registry, "weather", "st_readme").await;

    let response = service
        .run_fingerprint_backfill(Some(&admin()), RunRequest::default())
        .await
        .unwrap();
    assert_eq!(response.stats.versions_scanned, 1);
    assert_eq!(response.stats.fingerprints_inserted, 1);
    assert_eq!(response.stats.versions_patched, 1);

    let expected = Blake3FileHasher.fingerprint(&[
        FileDigest::new("SKILL.md", "a"),
        FileDigest::new("x.ts", "b"),
    ]);
    let entries = stores
        .registry
        .fingerprint_entries(version_id, 20)
        .await
        .unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].fingerprint, expected);
    let version = stores.registry.get_version(version_id).await.unwrap().unwrap();
    assert_eq!(version.fingerprint, Some(expected));

    let again = service
        .run_fingerprint_backfill(Some(&admin()), RunRequest::default())
        .await
        .unwrap();
    assert_eq!(again.stats.versions_scanned, 0);
}

#[tokio::test]
async fn capacity_exhaustion_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(&dir);
    let stores = Stores::open(&config.store).await.unwrap();
    let jobs = Jobs::new(&stores);
    let service = build_service(&config, &jobs, JobQueue::new(stores.jobs.clone()));
    for slug in ["a", "b", "c", "d"] {
        stores.registry.insert_skill(slug, None).await.unwrap();
    }

    let request = |max_batches: f64| RunRequest {
        dry_run: Some(true),
        batch_size: Some(2.0),
        max_batches: Some(max_batches),
    };
    let err = service
        .run_summary_backfill(Some(&admin()), request(1.0))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Backfill(_)));

    let ok = service
        .run_summary_backfill(Some(&admin()), request(2.0))
        .await
        .unwrap();
    assert_eq!(ok.stats.skills_scanned, 4);
}

#[tokio::test]
async fn scheduled_job_runs_through_scheduler() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config_in(&dir);
    config.scheduler.poll_interval_secs = 1;
    let stores = Stores::open(&config.store).await.unwrap();
    let jobs = Jobs::new(&stores);
    let (_, version_id) = publish(&stores.registry, "weather", "st_readme").await;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut scheduler = build_scheduler(&config.scheduler, &stores, &jobs, shutdown_rx).unwrap();
    scheduler.init().await.unwrap();
    let queue = scheduler.queue();
    let service = Arc::new(build_service(&config, &jobs, queue.clone()));
    let handle = tokio::spawn(async move { scheduler.run().await });

    let scheduled = service
        .schedule_fingerprint_backfill(Some(&admin()), ScheduleRequest::default())
        .await
        .unwrap();
    assert!(scheduled.ok);

    let mut status = JobStatus::Pending;
    for _ in 0..100 {
        status = queue
            .store()
            .job(scheduled.job_id)
            .await
            .unwrap()
            .unwrap()
            .status;
        if status == JobStatus::Completed {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(status, JobStatus::Completed);
    let version = stores.registry.get_version(version_id).await.unwrap().unwrap();
    assert!(version.fingerprint.is_some());

    let _ = shutdown_tx.send(true);
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("scheduler should stop")
        .expect("task should complete");
}

#[tokio::test]
async fn overdue_cron_task_runs_through_scheduler() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config_in(&dir);
    config.scheduler.tasks = vec![ScheduledTaskConfig {
        name: "nightly-summaries".into(),
        cron: "0 0 3 * * *".into(),
        kind: "summary_backfill".into(),
        dry_run: false,
    }];
    config.validate().unwrap();
    let stores = Stores::open(&config.store).await.unwrap();
    let jobs = Jobs::new(&stores);
    let (skill_id, _) = publish(&stores.registry, "weather", "st_readme").await;
    stores
        .registry
        .put_blob("st_readme", README.as_bytes(), None)
        .await
        .unwrap();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut scheduler = build_scheduler(&config.scheduler, &stores, &jobs, shutdown_rx).unwrap();
    scheduler.init().await.unwrap();
    // A fresh task only fires at its next occurrence; pretend it last ran long ago.
    stores
        .jobs
        .record_run("nightly-summaries", "2000-01-01T00:00:00.000Z")
        .await
        .unwrap();
    let handle = tokio::spawn(async move { scheduler.run().await });

    let mut summary = None;
    for _ in 0..100 {
        summary = stores
            .registry
            .get_skill(skill_id)
            .await
            .unwrap()
            .unwrap()
            .summary;
        if summary.is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(summary.as_deref(), Some("Current weather and forecasts."));

    let _ = shutdown_tx.send(true);
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("scheduler should stop")
        .expect("task should complete");
}

#[tokio::test]
async fn filesystem_blob_backend_feeds_summaries() {
    let dir = tempfile::tempdir().unwrap();
    let blob_dir = dir.path().join("blobs");
    let mut config = config_in(&dir);
    config.store.blob_backend = BlobBackend::Fs;
    config.store.blob_dir = Some(blob_dir.to_string_lossy().into_owned());
    config.validate().unwrap();

    let stores = Stores::open(&config.store).await.unwrap();
    let jobs = Jobs::new(&stores);
    let service = build_service(&config, &jobs, JobQueue::new(stores.jobs.clone()));
    let (skill_id, version_id) = publish(&stores.registry, "weather", "st_readme").await;
    FsBlobStore::new(&blob_dir)
        .put("st_readme", README.as_bytes())
        .await
        .unwrap();

    let response = service
        .run_summary_backfill(Some(&admin()), RunRequest::default())
        .await
        .unwrap();
    assert_eq!(response.stats.skills_patched, 1);
    assert_eq!(response.stats.missing_storage_blob, 0);
    let skill = stores.registry.get_skill(skill_id).await.unwrap().unwrap();
    assert_eq!(skill.summary.as_deref(), Some("Current weather and forecasts."));
    let version = stores.registry.get_version(version_id).await.unwrap().unwrap();
    assert_ne!(version.parsed, ParsedMetadata::default());
}

#[tokio::test]
async fn unauthorized_callers_change_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(&dir);
    let stores = Stores::open(&config.store).await.unwrap();
    let jobs = Jobs::new(&stores);
    let service = build_service(&config, &jobs, JobQueue::new(stores.jobs.clone()));
    let (_, version_id) = publish(&stores.registry, "weather", "st_readme").await;

    let user = Identity::new("reader", Role::User);
    assert!(
        service
            .run_fingerprint_backfill(Some(&user), RunRequest::default())
            .await
            .is_err()
    );
    assert!(
        service
            .run_fingerprint_backfill(None, RunRequest::default())
            .await
            .is_err()
    );
    let version = stores.registry.get_version(version_id).await.unwrap().unwrap();
    assert!(version.fingerprint.is_none());
}
