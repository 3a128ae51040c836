//! Skill registry records, store traits, and the `SQLite` and filesystem backends.

mod error;
pub mod fs_blob;
pub mod registry;
pub mod sqlite;
pub mod types;

pub use error::StoreError;
pub use fs_blob::FsBlobStore;
pub use registry::{BlobStore, BoxFuture, RegistryStore};
pub use sqlite::SqliteStore;
pub use types::{
    Cursor, FingerprintApplyOutcome, FingerprintEntry, FingerprintPatch, NewSkillVersion, Page,
    ParsedMetadata, Skill, SkillFile, SkillVersion, SummaryPatch, now_rfc3339,
};
