use super::SqliteStore;
use crate::error::StoreError;
use crate::types::{NewSkillVersion, Skill, SkillVersion, SummaryPatch, now_rfc3339};

type SkillTuple = (i64, String, Option<i64>, Option<String>, String, String);

type SkillVersionTuple = (i64, i64, String, String, String, Option<String>, String);

fn skill_from_tuple(t: SkillTuple) -> Skill {
    Skill {
        id: t.0,
        slug: t.1,
        latest_version_id: t.2,
        summary: t.3,
        created_at: t.4,
        updated_at: t.5,
    }
}

fn version_from_tuple(t: SkillVersionTuple) -> Result<SkillVersion, StoreError> {
    Ok(SkillVersion {
        id: t.0,
        skill_id: t.1,
        version: t.2,
        files: serde_json::from_str(&t.3)?,
        parsed: serde_json::from_str(&t.4)?,
        fingerprint: t.5,
        created_at: t.6,
    })
}

const SKILL_COLUMNS: &str = "id, slug, latest_version_id, summary, created_at, updated_at";
const VERSION_COLUMNS: &str = "id, skill_id, version, files, parsed, fingerprint, created_at";

impl SqliteStore {
    pub(super) async fn skills_after(
        &self,
        after_id: i64,
        limit: u32,
    ) -> Result<Vec<Skill>, StoreError> {
        let rows: Vec<SkillTuple> = sqlx::query_as(&format!(
            "SELECT {SKILL_COLUMNS} FROM skills WHERE id > ? ORDER BY id ASC LIMIT ?"
        ))
        .bind(after_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(skill_from_tuple).collect())
    }

    pub(super) async fn versions_after(
        &self,
        after_id: i64,
        limit: u32,
    ) -> Result<Vec<SkillVersion>, StoreError> {
        let rows: Vec<SkillVersionTuple> = sqlx::query_as(&format!(
            "SELECT {VERSION_COLUMNS} FROM skill_versions WHERE id > ? ORDER BY id ASC LIMIT ?"
        ))
        .bind(after_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(version_from_tuple).collect()
    }

    pub(super) async fn load_version(&self, id: i64) -> Result<Option<SkillVersion>, StoreError> {
        let row: Option<SkillVersionTuple> = sqlx::query_as(&format!(
            "SELECT {VERSION_COLUMNS} FROM skill_versions WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(version_from_tuple).transpose()
    }

    /// Load a skill by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn get_skill(&self, id: i64) -> Result<Option<Skill>, StoreError> {
        let row: Option<SkillTuple> =
            sqlx::query_as(&format!("SELECT {SKILL_COLUMNS} FROM skills WHERE id = ?"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(skill_from_tuple))
    }

    /// Insert a skill without a published version and return its id.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails (e.g. duplicate slug).
    pub async fn insert_skill(&self, slug: &str, summary: Option<&str>) -> Result<i64, StoreError> {
        let now = now_rfc3339();
        let row: (i64,) = sqlx::query_as(
            "INSERT INTO skills (slug, summary, created_at, updated_at) \
             VALUES (?, ?, ?, ?) RETURNING id",
        )
        .bind(slug)
        .bind(summary)
        .bind(&now)
        .bind(&now)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0)
    }

    /// Insert a version for `skill_id` and return its id.
    ///
    /// Does not move the skill's latest pointer; see [`Self::set_latest_version`].
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the insert fails.
    pub async fn insert_version(
        &self,
        skill_id: i64,
        version: &NewSkillVersion,
    ) -> Result<i64, StoreError> {
        let files = serde_json::to_string(&version.files)?;
        let parsed = serde_json::to_string(&version.parsed)?;
        let row: (i64,) = sqlx::query_as(
            "INSERT INTO skill_versions (skill_id, version, files, parsed, fingerprint, created_at) \
             VALUES (?, ?, ?, ?, ?, ?) RETURNING id",
        )
        .bind(skill_id)
        .bind(&version.version)
        .bind(files)
        .bind(parsed)
        .bind(version.fingerprint.as_deref())
        .bind(now_rfc3339())
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0)
    }

    /// Point a skill at its latest version (or clear the pointer).
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the skill does not exist, or a database error.
    pub async fn set_latest_version(
        &self,
        skill_id: i64,
        version_id: Option<i64>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE skills SET latest_version_id = ?, updated_at = ? WHERE id = ?")
            .bind(version_id)
            .bind(now_rfc3339())
            .bind(skill_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                kind: "skill",
                id: skill_id,
            });
        }
        Ok(())
    }

    /// Delete a version row. Fingerprint entries are left in place.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub async fn delete_version(&self, version_id: i64) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM skill_versions WHERE id = ?")
            .bind(version_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Overwrite a skill's summary and/or its version's parsed metadata in one
    /// transaction. The skill's `updated_at` moves only when the summary is written.
    pub(super) async fn write_summary_patch(&self, patch: &SummaryPatch) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        if let Some(summary) = &patch.summary {
            let result = sqlx::query("UPDATE skills SET summary = ?, updated_at = ? WHERE id = ?")
                .bind(summary)
                .bind(now_rfc3339())
                .bind(patch.skill_id)
                .execute(&mut *tx)
                .await?;
            if result.rows_affected() == 0 {
                return Err(StoreError::NotFound {
                    kind: "skill",
                    id: patch.skill_id,
                });
            }
        }

        if let Some(parsed) = &patch.parsed {
            let result = sqlx::query("UPDATE skill_versions SET parsed = ? WHERE id = ?")
                .bind(serde_json::to_string(parsed)?)
                .bind(patch.version_id)
                .execute(&mut *tx)
                .await?;
            if result.rows_affected() == 0 {
                return Err(StoreError::NotFound {
                    kind: "skill version",
                    id: patch.version_id,
                });
            }
        }

        tx.commit().await?;
        Ok(())
    }
}
