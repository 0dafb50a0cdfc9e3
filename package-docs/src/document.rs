use std::collections::BTreeMap;

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use typst_mcp_registry::ExampleFile;
use typst_mcp_registry::PackageMetadata;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentLinks {
    pub universe_url: String,
    pub github_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub homepage_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository_url: Option<String>,
}

impl DocumentLinks {
    pub fn for_package(package: &str, version: &str, metadata: &PackageMetadata) -> Self {
        Self {
            universe_url: format!("https://typst.app/universe/package/{package}/"),
            github_url: format!(
                "https://github.com/typst/packages/tree/main/packages/preview/{package}/{version}"
            ),
            homepage_url: metadata.homepage.clone(),
            repository_url: metadata.repository.clone(),
        }
    }
}

/// Everything known about one package version. Optional sections are `None`
/// when the file does not exist, could not be fetched, or was skipped to stay
/// within the time budget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedDocument {
    pub package: String,
    pub version: String,
    pub metadata: PackageMetadata,
    pub readme: Option<String>,
    pub license: Option<String>,
    pub changelog: Option<String>,
    pub examples: Option<Vec<ExampleFile>>,
    pub docs: Option<BTreeMap<String, String>>,
    pub links: DocumentLinks,
    pub import_statement: String,
    pub fetched_at: DateTime<Utc>,
    /// False when the examples and docs phase was skipped.
    pub complete: bool,
}

impl CachedDocument {
    pub fn cache_key(&self) -> String {
        format!("{}@{}", self.package, self.version)
    }

    pub fn uri(&self) -> String {
        package_uri(&self.package, &self.version)
    }
}

pub fn import_statement(package: &str, version: &str) -> String {
    format!("#import \"@preview/{package}:{version}\": *")
}

/// Resource URI of a package version's documentation.
pub fn package_uri(package: &str, version: &str) -> String {
    format!("typst://v1/packages/{package}/{version}")
}
