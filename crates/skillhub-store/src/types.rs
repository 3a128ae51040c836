use serde::{Deserialize, Serialize};

/// Opaque pagination checkpoint.
///
/// Produced by a page read and handed back verbatim to fetch the next page.
/// Callers must not interpret its contents.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(String);

impl Cursor {
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One bounded page of records in ascending identity order.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub cursor: Option<Cursor>,
    pub is_done: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Skill {
    pub id: i64,
    pub slug: String,
    pub latest_version_id: Option<i64>,
    pub summary: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// A file entry of a published skill version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillFile {
    pub path: String,
    #[serde(default)]
    pub size: i64,
    pub sha256: String,
    pub storage_id: String,
}

/// Metadata derived from a version's README.
///
/// The parser output is not a fixed record, so every block stays an open
/// JSON document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedMetadata {
    #[serde(default)]
    pub frontmatter: serde_json::Map<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clawdis: Option<serde_json::Value>,
}

impl ParsedMetadata {
    /// `true` when no block carries any data.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frontmatter.is_empty() && self.metadata.is_none() && self.clawdis.is_none()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkillVersion {
    pub id: i64,
    pub skill_id: i64,
    pub version: String,
    pub files: Vec<SkillFile>,
    pub parsed: ParsedMetadata,
    pub fingerprint: Option<String>,
    pub created_at: String,
}

/// Input for inserting a version row.
#[derive(Debug, Clone, Default)]
pub struct NewSkillVersion {
    pub version: String,
    pub files: Vec<SkillFile>,
    pub parsed: ParsedMetadata,
    pub fingerprint: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FingerprintEntry {
    pub id: i64,
    pub skill_id: i64,
    pub version_id: i64,
    pub fingerprint: String,
    pub created_at: String,
}

/// Summary/parsed overwrite for one skill and its latest version.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryPatch {
    pub skill_id: i64,
    pub version_id: i64,
    pub summary: Option<String>,
    pub parsed: Option<ParsedMetadata>,
}

/// Fingerprint repair for one version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FingerprintPatch {
    pub version_id: i64,
    pub fingerprint: String,
    pub patch_version: bool,
    pub replace_entries: bool,
    pub existing_entry_ids: Vec<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FingerprintApplyOutcome {
    Applied,
    /// The version row was deleted before the patch ran.
    VersionMissing,
}

/// Current UTC time in the RFC 3339 form stored in timestamp columns.
#[must_use]
pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
