use serde::Deserialize;
use serde::Serialize;

/// The `[package]` table of a package's `typst.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageMetadata {
    pub name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entrypoint: Option<String>,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub homepage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compiler: Option<String>,
    /// Set when the manifest was missing or unreadable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Deserialize)]
struct Manifest {
    package: ManifestPackage,
}

#[derive(Deserialize)]
struct ManifestPackage {
    entrypoint: Option<String>,
    #[serde(default)]
    authors: Vec<String>,
    license: Option<String>,
    description: Option<String>,
    homepage: Option<String>,
    repository: Option<String>,
    #[serde(default)]
    keywords: Vec<String>,
    #[serde(default)]
    categories: Vec<String>,
    compiler: Option<String>,
}

impl PackageMetadata {
    pub fn unavailable(package: &str, version: &str, reason: impl Into<String>) -> Self {
        Self {
            name: package.to_string(),
            version: version.to_string(),
            error: Some(reason.into()),
            ..Self::default()
        }
    }

    /// Parses a manifest. Name and version always come from the validated
    /// request, not from the file.
    pub fn from_manifest(package: &str, version: &str, manifest: &str) -> Self {
        match toml::from_str::<Manifest>(manifest) {
            Ok(Manifest { package: parsed }) => Self {
                name: package.to_string(),
                version: version.to_string(),
                entrypoint: parsed.entrypoint,
                authors: parsed.authors,
                license: parsed.license,
                description: parsed.description,
                homepage: parsed.homepage,
                repository: parsed.repository,
                keywords: parsed.keywords,
                categories: parsed.categories,
                compiler: parsed.compiler,
                error: None,
            },
            Err(err) => Self::unavailable(package, version, format!("invalid typst.toml: {err}")),
        }
    }
}
