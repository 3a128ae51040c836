use std::sync::Arc;

use serde::{Deserialize, Serialize};
use skillhub_store::{
    BlobStore, Cursor, ParsedMetadata, RegistryStore, SkillFile, StoreError, SummaryPatch,
};

use crate::error::BackfillError;
use crate::params::BackfillParams;
use crate::readme::ReadmePatcher;

const README_NAMES: [&str; 2] = ["skill.md", "skills.md"];

/// Classification of one skill for the summary backfill.
#[derive(Debug, Clone, PartialEq)]
pub enum SummaryItem {
    MissingLatestVersion {
        skill_id: i64,
    },
    /// The latest version pointer refers to a row that no longer exists.
    MissingVersionDoc {
        skill_id: i64,
        version_id: i64,
    },
    MissingReadme {
        skill_id: i64,
        version_id: i64,
    },
    Ready(ReadyItem),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReadyItem {
    pub skill_id: i64,
    pub version_id: i64,
    pub summary: Option<String>,
    pub parsed: ParsedMetadata,
    pub readme_storage_id: String,
}

#[derive(Debug, Clone)]
pub struct SummaryPage {
    pub items: Vec<SummaryItem>,
    pub cursor: Option<Cursor>,
    pub is_done: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryStats {
    pub skills_scanned: u64,
    pub skills_patched: u64,
    pub versions_patched: u64,
    pub missing_latest_version: u64,
    pub missing_readme: u64,
    pub missing_storage_blob: u64,
}

fn find_readme(files: &[SkillFile]) -> Option<&SkillFile> {
    files.iter().find(|f| {
        let path = f.path.to_ascii_lowercase();
        README_NAMES.contains(&path.as_str())
    })
}

/// Read one page of skills and classify each against its latest version.
///
/// # Errors
///
/// Returns an error if a store read fails.
pub async fn fetch_summary_page(
    store: &dyn RegistryStore,
    cursor: Option<Cursor>,
    batch_size: u32,
) -> Result<SummaryPage, StoreError> {
    let page = store.skills_page(cursor, batch_size).await?;
    let mut items = Vec::with_capacity(page.items.len());

    for skill in page.items {
        let Some(version_id) = skill.latest_version_id else {
            items.push(SummaryItem::MissingLatestVersion { skill_id: skill.id });
            continue;
        };
        let Some(version) = store.get_version(version_id).await? else {
            items.push(SummaryItem::MissingVersionDoc {
                skill_id: skill.id,
                version_id,
            });
            continue;
        };
        let Some(readme) = find_readme(&version.files) else {
            items.push(SummaryItem::MissingReadme {
                skill_id: skill.id,
                version_id,
            });
            continue;
        };
        items.push(SummaryItem::Ready(ReadyItem {
            skill_id: skill.id,
            version_id,
            readme_storage_id: readme.storage_id.clone(),
            summary: skill.summary,
            parsed: version.parsed,
        }));
    }

    Ok(SummaryPage {
        items,
        cursor: page.cursor,
        is_done: page.is_done,
    })
}

/// Overwrite the skill summary and/or the version's parsed metadata.
///
/// # Errors
///
/// Returns an error if the store write fails or a target row is gone.
pub async fn apply_summary_patch(
    store: &dyn RegistryStore,
    skill_id: i64,
    version_id: i64,
    summary: Option<String>,
    parsed: Option<ParsedMetadata>,
) -> Result<(), StoreError> {
    tracing::debug!(
        skill_id,
        version_id,
        summary = summary.is_some(),
        parsed = parsed.is_some(),
        "applying summary patch"
    );
    store
        .apply_summary_patch(SummaryPatch {
            skill_id,
            version_id,
            summary,
            parsed,
        })
        .await
}

/// Recomputes skill summaries and parsed metadata from README content.
pub struct SummaryBackfill {
    store: Arc<dyn RegistryStore>,
    blobs: Arc<dyn BlobStore>,
    patcher: Arc<dyn ReadmePatcher>,
}

impl SummaryBackfill {
    #[must_use]
    pub fn new(
        store: Arc<dyn RegistryStore>,
        blobs: Arc<dyn BlobStore>,
        patcher: Arc<dyn ReadmePatcher>,
    ) -> Self {
        Self {
            store,
            blobs,
            patcher,
        }
    }

    /// Scan every skill, page by page, and patch those whose README-derived
    /// state differs from what is stored.
    ///
    /// # Errors
    ///
    /// Returns [`BackfillError::Incomplete`] if the scan does not finish within
    /// `params.max_batches` pages, or a store error.
    pub async fn run(&self, params: BackfillParams) -> Result<SummaryStats, BackfillError> {
        let mut stats = SummaryStats::default();
        let mut cursor = None;
        let mut is_done = false;
        let mut batches = 0;

        while batches < params.max_batches && !is_done {
            let page = fetch_summary_page(self.store.as_ref(), cursor.take(), params.batch_size)
                .await?;
            batches += 1;
            cursor = page.cursor;
            is_done = page.is_done;

            for item in page.items {
                self.process(item, params.dry_run, &mut stats).await?;
            }
            tracing::debug!(batch = batches, scanned = stats.skills_scanned, "summary batch done");
        }

        if !is_done {
            tracing::warn!(
                batches,
                scanned = stats.skills_scanned,
                skills_patched = stats.skills_patched,
                versions_patched = stats.versions_patched,
                "summary backfill stopped before reaching the end"
            );
            return Err(BackfillError::Incomplete { batches });
        }

        tracing::info!(
            batches,
            dry_run = params.dry_run,
            scanned = stats.skills_scanned,
            skills_patched = stats.skills_patched,
            versions_patched = stats.versions_patched,
            missing_latest_version = stats.missing_latest_version,
            missing_readme = stats.missing_readme,
            missing_storage_blob = stats.missing_storage_blob,
            "summary backfill complete"
        );
        Ok(stats)
    }

    async fn process(
        &self,
        item: SummaryItem,
        dry_run: bool,
        stats: &mut SummaryStats,
    ) -> Result<(), BackfillError> {
        stats.skills_scanned += 1;

        let item = match item {
            SummaryItem::MissingLatestVersion { .. } | SummaryItem::MissingVersionDoc { .. } => {
                stats.missing_latest_version += 1;
                return Ok(());
            }
            SummaryItem::MissingReadme { .. } => {
                stats.missing_readme += 1;
                return Ok(());
            }
            SummaryItem::Ready(item) => item,
        };

        let Some(readme) = self.blobs.get_text(&item.readme_storage_id).await? else {
            tracing::debug!(
                skill_id = item.skill_id,
                storage_id = %item.readme_storage_id,
                "README blob missing"
            );
            stats.missing_storage_blob += 1;
            return Ok(());
        };

        let Some(patch) = self
            .patcher
            .patch(&readme, item.summary.as_deref(), &item.parsed)
            .filter(|p| !p.is_empty())
        else {
            return Ok(());
        };

        if patch.summary.is_some() {
            stats.skills_patched += 1;
        }
        if patch.parsed.is_some() {
            stats.versions_patched += 1;
        }
        if !dry_run {
            apply_summary_patch(
                self.store.as_ref(),
                item.skill_id,
                item.version_id,
                patch.summary,
                patch.parsed,
            )
            .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use skillhub_store::{NewSkillVersion, SqliteStore};

    use super::*;
    use crate::readme::{FrontmatterPatcher, ReadmePatch};

    const README: &str = "---\nname: demo\ndescription: Fresh summary.\n---\nBody.";

    fn file(path: &str, storage_id: &str) -> SkillFile {
        SkillFile {
            path: path.into(),
            size: 1,
            sha256: "00".into(),
            storage_id: storage_id.into(),
        }
    }

    async fn test_store() -> Arc<SqliteStore> {
        Arc::new(SqliteStore::new(":memory:").await.unwrap())
    }

    async fn publish(store: &SqliteStore, slug: &str, files: Vec<SkillFile>) -> (i64, i64) {
        let skill_id = store.insert_skill(slug, Some("stale")).await.unwrap();
        let version_id = store
            .insert_version(
                skill_id,
                &NewSkillVersion {
                    version: "1.0.0".into(),
                    files,
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

    fn backfill(store: &Arc<SqliteStore>) -> SummaryBackfill {
        SummaryBackfill::new(store.clone(), store.clone(), Arc::new(FrontmatterPatcher))
    }

    #[test]
    fn readme_match_is_case_insensitive_and_exact() {
        let files = vec![file("docs/SKILL.md", "a"), file("Skills.MD", "b")];
        assert_eq!(find_readme(&files).unwrap().storage_id, "b");
        assert!(find_readme(&[file("README.md", "c")]).is_none());
    }

    #[tokio::test]
    async fn classifies_each_failure_mode() {
        let store = test_store().await;
        let no_latest = store.insert_skill("no-latest", None).await.unwrap();
        let (gone, gone_version) = publish(&store, "gone", vec![]).await;
        store.delete_version(gone_version).await.unwrap();
        let (no_readme, no_readme_version) = publish(&store, "no-readme", vec![file("x.ts", "x")]).await;
        let (ready, ready_version) = publish(&store, "ready", vec![file("SKILL.md", "st")]).await;

        let page = fetch_summary_page(store.as_ref(), None, 10).await.unwrap();
        assert!(page.is_done);
        assert_eq!(
            page.items,
            vec![
                SummaryItem::MissingLatestVersion { skill_id: no_latest },
                SummaryItem::MissingVersionDoc {
                    skill_id: gone,
                    version_id: gone_version
                },
                SummaryItem::MissingReadme {
                    skill_id: no_readme,
                    version_id: no_readme_version
                },
                SummaryItem::Ready(ReadyItem {
                    skill_id: ready,
                    version_id: ready_version,
                    summary: Some("stale".into()),
                    parsed: ParsedMetadata::default(),
                    readme_storage_id: "st".into(),
                }),
            ]
        );
    }

    #[tokio::test]
    async fn skill_without_latest_version_is_counted() {
        let store = test_store().await;
        store.insert_skill("orphan", None).await.unwrap();

        let stats = backfill(&store).run(BackfillParams::default()).await.unwrap();
        assert_eq!(stats.skills_scanned, 1);
        assert_eq!(stats.missing_latest_version, 1);
        assert_eq!(stats.skills_patched, 0);
    }

    #[tokio::test]
    async fn patches_summary_and_parsed_then_goes_quiet() {
        let store = test_store().await;
        let (skill_id, version_id) = publish(&store, "demo", vec![file("SKILL.md", "st")]).await;
        store.put_blob("st", README.as_bytes(), None).await.unwrap();

        let first = backfill(&store).run(BackfillParams::default()).await.unwrap();
        assert_eq!(first.skills_patched, 1);
        assert_eq!(first.versions_patched, 1);

        let skill = store.get_skill(skill_id).await.unwrap().unwrap();
        assert_eq!(skill.summary.as_deref(), Some("Fresh summary."));
        let version = store.get_version(version_id).await.unwrap().unwrap();
        assert_eq!(version.parsed.frontmatter["name"], "demo");

        let second = backfill(&store).run(BackfillParams::default()).await.unwrap();
        assert_eq!(second.skills_scanned, 1);
        assert_eq!(second.skills_patched, 0);
        assert_eq!(second.versions_patched, 0);
    }

    #[tokio::test]
    async fn dry_run_counts_without_writing() {
        let store = test_store().await;
        let (skill_id, _) = publish(&store, "demo", vec![file("SKILL.md", "st")]).await;
        store.put_blob("st", README.as_bytes(), None).await.unwrap();

        let dry = backfill(&store)
            .run(BackfillParams {
                dry_run: true,
                ..BackfillParams::default()
            })
            .await
            .unwrap();
        let skill = store.get_skill(skill_id).await.unwrap().unwrap();
        assert_eq!(skill.summary.as_deref(), Some("stale"));

        let real = backfill(&store).run(BackfillParams::default()).await.unwrap();
        assert_eq!(dry, real);
    }

    #[tokio::test]
    async fn missing_blob_is_counted() {
        let store = test_store().await;
        publish(&store, "demo", vec![file("skill.md", "absent")]).await;

        let stats = backfill(&store).run(BackfillParams::default()).await.unwrap();
        assert_eq!(stats.missing_storage_blob, 1);
        assert_eq!(stats.skills_patched, 0);
    }

    #[tokio::test]
    async fn empty_patch_is_skipped() {
        let store = test_store().await;
        publish(&store, "demo", vec![file("SKILL.md", "st")]).await;
        store.put_blob("st", b"anything", None).await.unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let patcher = move |_: &str, _: Option<&str>, _: &ParsedMetadata| {
            seen.fetch_add(1, Ordering::Relaxed);
            Some(ReadmePatch::default())
        };
        let job = SummaryBackfill::new(store.clone(), store.clone(), Arc::new(patcher));

        let stats = job.run(BackfillParams::default()).await.unwrap();
        assert_eq!(calls.load(Ordering::Relaxed), 1);
        assert_eq!(stats.skills_patched, 0);
        assert_eq!(stats.versions_patched, 0);
    }

    #[tokio::test]
    async fn fails_when_batches_run_out() {
        let store = test_store().await;
        for slug in ["a", "b", "c"] {
            store.insert_skill(slug, None).await.unwrap();
        }

        let err = backfill(&store)
            .run(BackfillParams {
                dry_run: false,
                batch_size: 1,
                max_batches: 2,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, BackfillError::Incomplete { batches: 2 }));
        assert_eq!(err.to_string(), "Backfill incomplete (maxBatches reached)");

        let stats = backfill(&store)
            .run(BackfillParams {
                dry_run: false,
                batch_size: 1,
                max_batches: 3,
            })
            .await
            .unwrap();
        assert_eq!(stats.skills_scanned, 3);
    }

    #[tokio::test]
    async fn empty_registry_completes() {
        let store = test_store().await;
        let stats = backfill(&store).run(BackfillParams::default()).await.unwrap();
        assert_eq!(stats, SummaryStats::default());
    }

    #[test]
    fn stats_serialize_camel_case() {
        let json = serde_json::to_value(SummaryStats::default()).unwrap();
        for key in [
            "skillsScanned",
            "skillsPatched",
            "versionsPatched",
            "missingLatestVersion",
            "missingReadme",
            "missingStorageBlob",
        ] {
            assert!(json.get(key).is_some(), "missing {key}");
        }
    }
}
