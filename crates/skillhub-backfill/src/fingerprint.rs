use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use skillhub_store::{
    Cursor, FingerprintApplyOutcome, FingerprintEntry, FingerprintPatch, RegistryStore,
    SkillVersion, StoreError,
};

use crate::error::BackfillError;
use crate::hash::{FileDigest, FileHasher};
use crate::params::BackfillParams;

/// Existing entries read per version when classifying.
pub const MAX_ENTRIES_PER_VERSION: u32 = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntrySummary {
    pub id: i64,
    pub fingerprint: String,
}

/// A version whose fingerprint field or entries need a look.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FingerprintItem {
    pub version_id: i64,
    pub skill_id: i64,
    pub files: Vec<FileDigest>,
    pub fingerprint: Option<String>,
    pub entries: Vec<EntrySummary>,
}

impl FingerprintItem {
    fn distinct_entry_fingerprints(&self) -> BTreeSet<&str> {
        self.entries.iter().map(|e| e.fingerprint.as_str()).collect()
    }
}

#[derive(Debug, Clone)]
pub struct FingerprintPage {
    pub items: Vec<FingerprintItem>,
    pub cursor: Option<Cursor>,
    pub is_done: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FingerprintStats {
    pub versions_scanned: u64,
    pub versions_patched: u64,
    pub fingerprints_inserted: u64,
    pub fingerprint_mismatches: u64,
    /// Versions deleted between classification and patching.
    pub versions_missing: u64,
}

impl FingerprintStats {
    fn record_writes(&mut self, patch_version: bool, replace_entries: bool) {
        if patch_version {
            self.versions_patched += 1;
        }
        if replace_entries {
            self.fingerprints_inserted += 1;
        }
    }
}

/// Whether a version's stored fingerprint and entries are worth recomputing.
fn needs_attention(version: &SkillVersion, entries: &[FingerprintEntry]) -> bool {
    let distinct: BTreeSet<&str> = entries.iter().map(|e| e.fingerprint.as_str()).collect();
    let needs_field = version.fingerprint.is_none();
    let needs_entry = entries.is_empty();
    let mismatch = version.fingerprint.as_deref().is_some_and(|stored| {
        !entries.is_empty() && (distinct.len() > 1 || !distinct.contains(stored))
    });
    needs_field || needs_entry || mismatch
}

/// Read one page of versions and keep those that are missing a fingerprint
/// field, have no entry, or disagree with their entries.
///
/// # Errors
///
/// Returns an error if a store read fails.
pub async fn fetch_fingerprint_page(
    store: &dyn RegistryStore,
    cursor: Option<Cursor>,
    batch_size: u32,
) -> Result<FingerprintPage, StoreError> {
    let page = store.versions_page(cursor, batch_size).await?;
    let mut items = Vec::new();

    for version in page.items {
        let entries = store
            .fingerprint_entries(version.id, MAX_ENTRIES_PER_VERSION)
            .await?;
        if !needs_attention(&version, &entries) {
            continue;
        }
        items.push(FingerprintItem {
            version_id: version.id,
            skill_id: version.skill_id,
            files: version.files.iter().map(FileDigest::from).collect(),
            fingerprint: version.fingerprint,
            entries: entries
                .into_iter()
                .map(|e| EntrySummary {
                    id: e.id,
                    fingerprint: e.fingerprint,
                })
                .collect(),
        });
    }

    Ok(FingerprintPage {
        items,
        cursor: page.cursor,
        is_done: page.is_done,
    })
}

/// Write the computed fingerprint to the version and/or replace its entries.
///
/// # Errors
///
/// Returns an error if the store write fails. A deleted version is reported
/// through [`FingerprintApplyOutcome::VersionMissing`], not as an error.
pub async fn apply_fingerprint_patch(
    store: &dyn RegistryStore,
    version_id: i64,
    fingerprint: String,
    patch_version: bool,
    replace_entries: bool,
    existing_entry_ids: Vec<i64>,
) -> Result<FingerprintApplyOutcome, StoreError> {
    store
        .apply_fingerprint_patch(FingerprintPatch {
            version_id,
            fingerprint,
            patch_version,
            replace_entries,
            existing_entry_ids: if replace_entries {
                existing_entry_ids
            } else {
                Vec::new()
            },
        })
        .await
}

/// Recomputes version fingerprints and restores one correct entry per version.
pub struct FingerprintBackfill {
    store: Arc<dyn RegistryStore>,
    hasher: Arc<dyn FileHasher>,
}

impl FingerprintBackfill {
    #[must_use]
    pub fn new(store: Arc<dyn RegistryStore>, hasher: Arc<dyn FileHasher>) -> Self {
        Self { store, hasher }
    }

    /// Scan every version, page by page, and repair fingerprints that are
    /// absent or disagree with the file list.
    ///
    /// # Errors
    ///
    /// Returns [`BackfillError::Incomplete`] if the scan does not finish within
    /// `params.max_batches` pages, or a store error.
    pub async fn run(&self, params: BackfillParams) -> Result<FingerprintStats, BackfillError> {
        let mut stats = FingerprintStats::default();
        let mut cursor = None;
        let mut is_done = false;
        let mut batches = 0;

        while batches < params.max_batches && !is_done {
            let page =
                fetch_fingerprint_page(self.store.as_ref(), cursor.take(), params.batch_size)
                    .await?;
            batches += 1;
            cursor = page.cursor;
            is_done = page.is_done;

            for item in page.items {
                self.process(item, params.dry_run, &mut stats).await?;
            }
        }

        if !is_done {
            tracing::warn!(
                batches,
                scanned = stats.versions_scanned,
                versions_patched = stats.versions_patched,
                fingerprints_inserted = stats.fingerprints_inserted,
                "fingerprint backfill stopped before reaching the end"
            );
            return Err(BackfillError::Incomplete { batches });
        }

        tracing::info!(
            batches,
            dry_run = params.dry_run,
            scanned = stats.versions_scanned,
            versions_patched = stats.versions_patched,
            fingerprints_inserted = stats.fingerprints_inserted,
            mismatches = stats.fingerprint_mismatches,
            versions_missing = stats.versions_missing,
            "fingerprint backfill complete"
        );
        Ok(stats)
    }

    async fn process(
        &self,
        item: FingerprintItem,
        dry_run: bool,
        stats: &mut FingerprintStats,
    ) -> Result<(), BackfillError> {
        stats.versions_scanned += 1;

        let computed = self.hasher.fingerprint(&item.files);
        let distinct = item.distinct_entry_fingerprints();
        let entry_is_correct = distinct.len() == 1 && distinct.contains(computed.as_str());
        let version_is_correct = item.fingerprint.as_deref() == Some(computed.as_str());

        if !item.entries.is_empty() && !entry_is_correct {
            stats.fingerprint_mismatches += 1;
        }

        let patch_version = !version_is_correct;
        let replace_entries = !entry_is_correct;
        if !patch_version && !replace_entries {
            return Ok(());
        }
        if dry_run {
            stats.record_writes(patch_version, replace_entries);
            return Ok(());
        }

        let outcome = apply_fingerprint_patch(
            self.store.as_ref(),
            item.version_id,
            computed,
            patch_version,
            replace_entries,
            item.entries.iter().map(|e| e.id).collect(),
        )
        .await?;
        match outcome {
            FingerprintApplyOutcome::Applied => {
                stats.record_writes(patch_version, replace_entries);
            }
            // Nothing was written, so only the missing version is counted.
            FingerprintApplyOutcome::VersionMissing => {
                tracing::warn!(
                    version_id = item.version_id,
                    "version deleted before fingerprint patch"
                );
                stats.versions_missing += 1;
            }
        }
        Ok(())
    }
}
