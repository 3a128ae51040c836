use std::future::Future;
use std::pin::Pin;

use crate::error::StoreError;
use crate::types::{
    Cursor, FingerprintApplyOutcome, FingerprintEntry, FingerprintPatch, Page, Skill,
    SkillVersion, SummaryPatch,
};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Registry reads and per-item mutations used by the backfill jobs.
///
/// Every method is an independent store call; the two `apply_*` methods are
/// atomic per item.
pub trait RegistryStore: Send + Sync {
    /// Skills in ascending id order, starting after `cursor`.
    fn skills_page(
        &self,
        cursor: Option<Cursor>,
        limit: u32,
    ) -> BoxFuture<'_, Result<Page<Skill>, StoreError>>;

    /// Versions in ascending id order, starting after `cursor`.
    fn versions_page(
        &self,
        cursor: Option<Cursor>,
        limit: u32,
    ) -> BoxFuture<'_, Result<Page<SkillVersion>, StoreError>>;

    fn get_version(&self, id: i64) -> BoxFuture<'_, Result<Option<SkillVersion>, StoreError>>;

    /// Up to `limit` fingerprint entries recorded for `version_id`.
    fn fingerprint_entries(
        &self,
        version_id: i64,
        limit: u32,
    ) -> BoxFuture<'_, Result<Vec<FingerprintEntry>, StoreError>>;

    fn apply_summary_patch(&self, patch: SummaryPatch) -> BoxFuture<'_, Result<(), StoreError>>;

    fn apply_fingerprint_patch(
        &self,
        patch: FingerprintPatch,
    ) -> BoxFuture<'_, Result<FingerprintApplyOutcome, StoreError>>;
}

/// Content-addressed file storage.
pub trait BlobStore: Send + Sync {
    /// Raw bytes for `storage_id`, or `None` if the blob does not exist.
    fn get(&self, storage_id: &str) -> BoxFuture<'_, Result<Option<Vec<u8>>, StoreError>>;

    /// Blob decoded as UTF-8, replacing invalid sequences.
    fn get_text(&self, storage_id: &str) -> BoxFuture<'_, Result<Option<String>, StoreError>> {
        let fut = self.get(storage_id);
        Box::pin(async move {
            Ok(fut
                .await?
                .map(|bytes| String::from_utf8_lossy(&bytes).into_owned()))
        })
    }
}
