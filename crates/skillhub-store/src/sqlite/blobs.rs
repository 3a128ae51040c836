use super::SqliteStore;
use crate::error::StoreError;
use crate::registry::{BlobStore, BoxFuture};

impl SqliteStore {
    /// Store (or replace) a blob under `storage_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the upsert fails.
    pub async fn put_blob(
        &self,
        storage_id: &str,
        content: &[u8],
        content_type: Option<&str>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO blobs (storage_id, content, content_type) VALUES (?, ?, ?) \
             ON CONFLICT(storage_id) DO UPDATE SET \
             content = excluded.content, content_type = excluded.content_type",
        )
        .bind(storage_id)
        .bind(content)
        .bind(content_type)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

impl BlobStore for SqliteStore {
    fn get(&self, storage_id: &str) -> BoxFuture<'_, Result<Option<Vec<u8>>, StoreError>> {
        let storage_id = storage_id.to_owned();
        Box::pin(async move {
            let row: Option<(Vec<u8>,)> =
                sqlx::query_as("SELECT content FROM blobs WHERE storage_id = ?")
                    .bind(&storage_id)
                    .fetch_optional(&self.pool)
                    .await?;
            Ok(row.map(|r| r.0))
        })
    }
}
