use super::SqliteStore;
use crate::error::StoreError;
use crate::types::{FingerprintApplyOutcome, FingerprintEntry, FingerprintPatch, now_rfc3339};

type EntryTuple = (i64, i64, i64, String, String);

fn entry_from_tuple(t: EntryTuple) -> FingerprintEntry {
    FingerprintEntry {
        id: t.0,
        skill_id: t.1,
        version_id: t.2,
        fingerprint: t.3,
        created_at: t.4,
    }
}

impl SqliteStore {
    pub(super) async fn entries_for_version(
        &self,
        version_id: i64,
        limit: u32,
    ) -> Result<Vec<FingerprintEntry>, StoreError> {
        let rows: Vec<EntryTuple> = sqlx::query_as(
            "SELECT id, skill_id, version_id, fingerprint, created_at \
             FROM skill_version_fingerprints WHERE version_id = ? \
             ORDER BY id ASC LIMIT ?",
        )
        .bind(version_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(entry_from_tuple).collect())
    }

    /// Record a fingerprint entry for a version and return its id.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub async fn insert_fingerprint_entry(
        &self,
        skill_id: i64,
        version_id: i64,
        fingerprint: &str,
    ) -> Result<i64, StoreError> {
        let row: (i64,) = sqlx::query_as(
            "INSERT INTO skill_version_fingerprints (skill_id, version_id, fingerprint, created_at) \
             VALUES (?, ?, ?, ?) RETURNING id",
        )
        .bind(skill_id)
        .bind(version_id)
        .bind(fingerprint)
        .bind(now_rfc3339())
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0)
    }

    /// Set the version's fingerprint field and/or swap its entries for a single
    /// fresh one, in one transaction.
    pub(super) async fn write_fingerprint_patch(
        &self,
        patch: &FingerprintPatch,
    ) -> Result<FingerprintApplyOutcome, StoreError> {
        let mut tx = self.pool.begin().await?;

        let skill_id: Option<(i64,)> =
            sqlx::query_as("SELECT skill_id FROM skill_versions WHERE id = ?")
                .bind(patch.version_id)
                .fetch_optional(&mut *tx)
                .await?;
        let Some((skill_id,)) = skill_id else {
            return Ok(FingerprintApplyOutcome::VersionMissing);
        };

        if patch.patch_version {
            sqlx::query("UPDATE skill_versions SET fingerprint = ? WHERE id = ?")
                .bind(&patch.fingerprint)
                .bind(patch.version_id)
                .execute(&mut *tx)
                .await?;
        }

        if patch.replace_entries {
            for entry_id in &patch.existing_entry_ids {
                sqlx::query("DELETE FROM skill_version_fingerprints WHERE id = ?")
                    .bind(entry_id)
                    .execute(&mut *tx)
                    .await?;
            }
            sqlx::query(
                "INSERT INTO skill_version_fingerprints (skill_id, version_id, fingerprint, created_at) \
                 VALUES (?, ?, ?, ?)",
            )
            .bind(skill_id)
            .bind(patch.version_id)
            .bind(&patch.fingerprint)
            .bind(now_rfc3339())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(FingerprintApplyOutcome::Applied)
    }
}
