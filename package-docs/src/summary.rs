use chrono::DateTime;
use chrono::Utc;
use serde::Serialize;

use crate::document::CachedDocument;
use crate::document::DocumentLinks;

const README_PREVIEW_CHARS: usize = 500;
const LICENSE_HEAD_CHARS: usize = 100;

/// Compact view of a [`CachedDocument`] for tool responses.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PackageDocsSummary {
    pub package: String,
    pub version: String,
    pub description: Option<String>,
    pub authors: Vec<String>,
    pub license_type: Option<String>,
    pub readme_preview: Option<String>,
    pub readme_size: Option<usize>,
    pub license_head: Option<String>,
    pub has_changelog: bool,
    pub example_files: Vec<String>,
    pub doc_files: Vec<String>,
    pub links: DocumentLinks,
    pub import_statement: String,
    pub complete: bool,
    pub fetched_at: DateTime<Utc>,
}

impl From<&CachedDocument> for PackageDocsSummary {
    fn from(document: &CachedDocument) -> Self {
        Self {
            package: document.package.clone(),
            version: document.version.clone(),
            description: document.metadata.description.clone(),
            authors: document.metadata.authors.clone(),
            license_type: document.metadata.license.clone(),
            readme_preview: document
                .readme
                .as_deref()
                .map(|readme| truncate(readme, README_PREVIEW_CHARS, "...")),
            readme_size: document.readme.as_ref().map(String::len),
            license_head: document
                .license
                .as_deref()
                .map(|license| truncate(license.trim(), LICENSE_HEAD_CHARS, "")),
            has_changelog: document.changelog.is_some(),
            example_files: document
                .examples
                .iter()
                .flatten()
                .map(|example| example.filename.clone())
                .collect(),
            doc_files: document.docs.iter().flat_map(|docs| docs.keys().cloned()).collect(),
            links: document.links.clone(),
            import_statement: document.import_statement.clone(),
            complete: document.complete,
            fetched_at: document.fetched_at,
        }
    }
}

fn truncate(text: &str, max_chars: usize, marker: &str) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}{marker}", &text[..cut]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2, "..."), "hé...");
        assert_eq!(truncate("short", 10, "..."), "short");
        assert_eq!(truncate("exact", 5, "..."), "exact");
    }
}
