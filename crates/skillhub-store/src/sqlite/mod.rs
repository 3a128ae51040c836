mod blobs;
mod fingerprints;
mod skills;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::str::FromStr;

use crate::error::StoreError;
use crate::registry::{BoxFuture, RegistryStore};
use crate::types::{
    Cursor, FingerprintApplyOutcome, FingerprintEntry, FingerprintPatch, Page, Skill,
    SkillVersion, SummaryPatch,
};

#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the `SQLite` database and run migrations.
    ///
    /// Enables foreign key constraints at connection level so that
    /// `ON DELETE CASCADE` on versions is enforced.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrations fail.
    pub async fn new(path: &str) -> Result<Self, StoreError> {
        let in_memory = path == ":memory:";
        let url = if in_memory {
            "sqlite::memory:".to_string()
        } else {
            format!("sqlite:{path}?mode=rwc")
        };

        let opts = SqliteConnectOptions::from_str(&url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

        // A single connection keeps an in-memory database alive for the pool's lifetime.
        let pool = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { 5 })
            .connect_with(opts)
            .await?;

        Self::run_migrations(&pool).await?;
        tracing::debug!(path, "registry store opened");

        Ok(Self { pool })
    }

    /// Expose the underlying pool for shared access by other stores.
    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Run all migrations on the given pool.
    ///
    /// # Errors
    ///
    /// Returns an error if any migration fails.
    pub async fn run_migrations(pool: &SqlitePool) -> Result<(), StoreError> {
        sqlx::migrate!("../../migrations").run(pool).await?;
        Ok(())
    }
}

fn decode_cursor(cursor: Option<&Cursor>) -> Result<i64, StoreError> {
    match cursor {
        None => Ok(0),
        Some(c) => c
            .as_str()
            .parse::<i64>()
            .map_err(|_| StoreError::InvalidCursor(c.to_string())),
    }
}

/// Build a page from `limit + 1` fetched rows; the extra row only signals
/// that more data follows.
fn into_page<T>(
    mut rows: Vec<T>,
    limit: u32,
    after: Option<Cursor>,
    id_of: impl Fn(&T) -> i64,
) -> Page<T> {
    let limit = limit as usize;
    let is_done = rows.len() <= limit;
    rows.truncate(limit);
    let cursor = rows
        .last()
        .map(|row| Cursor::new(id_of(row).to_string()))
        .or(after);
    Page {
        items: rows,
        cursor,
        is_done,
    }
}

impl RegistryStore for SqliteStore {
    fn skills_page(
        &self,
        cursor: Option<Cursor>,
        limit: u32,
    ) -> BoxFuture<'_, Result<Page<Skill>, StoreError>> {
        Box::pin(async move {
            let after = decode_cursor(cursor.as_ref())?;
            let rows = self.skills_after(after, limit.saturating_add(1)).await?;
            Ok(into_page(rows, limit, cursor, |s| s.id))
        })
    }

    fn versions_page(
        &self,
        cursor: Option<Cursor>,
        limit: u32,
    ) -> BoxFuture<'_, Result<Page<SkillVersion>, StoreError>> {
        Box::pin(async move {
            let after = decode_cursor(cursor.as_ref())?;
            let rows = self.versions_after(after, limit.saturating_add(1)).await?;
            Ok(into_page(rows, limit, cursor, |v| v.id))
        })
    }

    fn get_version(&self, id: i64) -> BoxFuture<'_, Result<Option<SkillVersion>, StoreError>> {
        Box::pin(async move { self.load_version(id).await })
    }

    fn fingerprint_entries(
        &self,
        version_id: i64,
        limit: u32,
    ) -> BoxFuture<'_, Result<Vec<FingerprintEntry>, StoreError>> {
        Box::pin(async move { self.entries_for_version(version_id, limit).await })
    }

    fn apply_summary_patch(&self, patch: SummaryPatch) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async move { self.write_summary_patch(&patch).await })
    }

    fn apply_fingerprint_patch(
        &self,
        patch: FingerprintPatch,
    ) -> BoxFuture<'_, Result<FingerprintApplyOutcome, StoreError>> {
        Box::pin(async move { self.write_fingerprint_patch(&patch).await })
    }
}
