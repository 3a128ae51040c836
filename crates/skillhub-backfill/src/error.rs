use skillhub_store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum BackfillError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The scan did not reach the end of the table within `max_batches` pages.
    #[error("Backfill incomplete (maxBatches reached)")]
    Incomplete { batches: u32 },
}
