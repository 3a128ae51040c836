//! Summary and fingerprint backfills over the skill registry.
//!
//! Each job pages through the registry with an opaque cursor, classifies
//! records, computes a patch through an injected pure function, and applies
//! it unless running dry.

mod error;
pub mod fingerprint;
pub mod hash;
pub mod params;
pub mod readme;
pub mod summary;

pub use error::BackfillError;
pub use fingerprint::{FingerprintBackfill, FingerprintStats};
pub use hash::{Blake3FileHasher, FileDigest, FileHasher};
pub use params::{BackfillParams, clamp_int};
pub use readme::{FrontmatterPatcher, ReadmePatch, ReadmePatcher};
pub use summary::{SummaryBackfill, SummaryStats};
