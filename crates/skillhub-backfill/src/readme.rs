use serde_json::{Map, Value};
use skillhub_store::ParsedMetadata;

/// Fields a README says should change. At least one is set when returned
/// from a [`ReadmePatcher`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadmePatch {
    pub summary: Option<String>,
    pub parsed: Option<ParsedMetadata>,
}

impl ReadmePatch {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.summary.is_none() && self.parsed.is_none()
    }
}

/// Derives the summary and parsed metadata a skill should have from its README
/// and reports what differs from the current values.
pub trait ReadmePatcher: Send + Sync {
    fn patch(
        &self,
        readme: &str,
        current_summary: Option<&str>,
        current_parsed: &ParsedMetadata,
    ) -> Option<ReadmePatch>;
}

impl<F> ReadmePatcher for F
where
    F: Fn(&str, Option<&str>, &ParsedMetadata) -> Option<ReadmePatch> + Send + Sync,
{
    fn patch(
        &self,
        readme: &str,
        current_summary: Option<&str>,
        current_parsed: &ParsedMetadata,
    ) -> Option<ReadmePatch> {
        self(readme, current_summary, current_parsed)
    }
}

/// README patcher driven by the YAML frontmatter block of `SKILL.md`.
///
/// The summary is the frontmatter `description`, falling back to the first
/// prose paragraph of the body. A frontmatter block that is not a YAML mapping
/// yields no patch, so stored values are never replaced from a broken README.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrontmatterPatcher;

impl ReadmePatcher for FrontmatterPatcher {
    fn patch(
        &self,
        readme: &str,
        current_summary: Option<&str>,
        current_parsed: &ParsedMetadata,
    ) -> Option<ReadmePatch> {
        let (frontmatter, body) = match split_frontmatter(readme) {
            Ok(split) => split,
            Err(e) => {
                tracing::debug!("skipping README with invalid frontmatter: {e}");
                return None;
            }
        };
        let summary = frontmatter
            .get("description")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
            .or_else(|| first_paragraph(body));
        let parsed = parsed_from_frontmatter(frontmatter);

        let patch = ReadmePatch {
            summary: summary.filter(|s| Some(s.as_str()) != current_summary),
            parsed: (parsed != *current_parsed).then_some(parsed),
        };
        (!patch.is_empty()).then_some(patch)
    }
}

#[derive(Debug, thiserror::Error)]
enum FrontmatterError {
    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("expected a mapping")]
    NotAMapping,
}

/// Split a README into its frontmatter mapping and body.
///
/// Without an opening `---` line, or without a closing `---` line, the whole
/// README is body.
fn split_frontmatter(readme: &str) -> Result<(Map<String, Value>, &str), FrontmatterError> {
    let content = readme.trim_start_matches('\u{feff}').trim_start();
    let (first_line, rest) = content.split_once('\n').unwrap_or((content, ""));
    if first_line.trim_end() != "---" {
        return Ok((Map::new(), content));
    }
    let Some((yaml_end, body_start)) = find_closing_frontmatter(rest) else {
        return Ok((Map::new(), content));
    };

    let yaml = &rest[..yaml_end];
    let frontmatter = if yaml.trim().is_empty() {
        Map::new()
    } else {
        match serde_yaml::from_str::<Value>(yaml)? {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            _ => return Err(FrontmatterError::NotAMapping),
        }
    };
    Ok((frontmatter, &rest[body_start..]))
}

/// Byte range of the closing delimiter: a line that is exactly `---`.
///
/// Indented `---` lines belong to block scalars and do not close the block.
fn find_closing_frontmatter(content: &str) -> Option<(usize, usize)> {
    let mut pos = 0;
    for line in content.split_inclusive('\n') {
        if line.trim_end() == "---" {
            return Some((pos, pos + line.len()));
        }
        pos += line.len();
    }
    None
}

fn parsed_from_frontmatter(frontmatter: Map<String, Value>) -> ParsedMetadata {
    let metadata = frontmatter.get("metadata").filter(|v| v.is_object()).cloned();
    let clawdis = metadata
        .as_ref()
        .and_then(|m| m.get("clawdis"))
        .or_else(|| frontmatter.get("clawdis"))
        .filter(|v| v.is_object())
        .cloned();
    ParsedMetadata {
        frontmatter,
        metadata,
        clawdis,
    }
}

fn first_paragraph(body: &str) -> Option<String> {
    body.split("\n\n")
        .map(str::trim)
        .find(|p| !p.is_empty() && !p.starts_with('#') && !p.starts_with("```"))
        .map(|p| p.split_whitespace().collect::<Vec<_>>().join(" "))
}
