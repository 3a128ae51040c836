use serde::{Deserialize, Serialize};
use skillhub_store::SkillFile;

/// The part of a version file that feeds its fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDigest {
    pub path: String,
    pub sha256: String,
}

impl FileDigest {
    #[must_use]
    pub fn new(path: impl Into<String>, sha256: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            sha256: sha256.into(),
        }
    }
}

impl From<&SkillFile> for FileDigest {
    fn from(file: &SkillFile) -> Self {
        Self::new(file.path.clone(), file.sha256.clone())
    }
}

/// Canonical fingerprint of a version's file list.
///
/// Implementations must be pure: the same list in the same order always yields
/// the same string.
pub trait FileHasher: Send + Sync {
    fn fingerprint(&self, files: &[FileDigest]) -> String;
}

impl<F> FileHasher for F
where
    F: Fn(&[FileDigest]) -> String + Send + Sync,
{
    fn fingerprint(&self, files: &[FileDigest]) -> String {
        self(files)
    }
}

/// `blake3` over `path:sha256\n` lines in list order, hex encoded.
#[derive(Debug, Clone, Copy, Default)]
pub struct Blake3FileHasher;

impl FileHasher for Blake3FileHasher {
    fn fingerprint(&self, files: &[FileDigest]) -> String {
        let mut hasher = blake3::Hasher::new();
        for file in files {
            hasher.update(file.path.as_bytes());
            hasher.update(b":");
            hasher.update(file.sha256.as_bytes());
            hasher.update(b"\n");
        }
        hasher.finalize().to_hex().to_string()
    }
}
