//! `typst://v1/...` resource addressing and the JSON bodies served for each
//! resource.

use serde_json::Value;
use serde_json::json;
use typst_mcp_package_docs::CachedDocument;
use typst_mcp_package_docs::CachedEntry;

use crate::error::Result;
use crate::error::ServerError;

pub const URI_PREFIX: &str = "typst://v1/";
pub const JSON_MIME: &str = "application/json";

/// A fixed resource or template advertised to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceDescriptor {
    pub uri: &'static str,
    pub name: &'static str,
    pub description: &'static str,
}

pub const FIXED_RESOURCES: &[ResourceDescriptor] = &[
    ResourceDescriptor {
        uri: "typst://v1/",
        name: "root_index",
        description: "Index of all resource namespaces",
    },
    ResourceDescriptor {
        uri: "typst://v1/docs/",
        name: "docs_namespace",
        description: "Typst core documentation namespace",
    },
    ResourceDescriptor {
        uri: "typst://v1/packages/",
        name: "packages_namespace",
        description: "Typst Universe package namespace",
    },
    ResourceDescriptor {
        uri: "typst://v1/docs/chapters",
        name: "docs_chapters",
        description: "All documentation chapters with routes and sizes",
    },
    ResourceDescriptor {
        uri: "typst://v1/packages/cached",
        name: "packages_cached",
        description: "Package documentation cached on this machine",
    },
];

pub const RESOURCE_TEMPLATES: &[ResourceDescriptor] = &[
    ResourceDescriptor {
        uri: "typst://v1/docs/chapters/{route}",
        name: "docs_chapter",
        description: "One documentation chapter; use ____ as the path separator",
    },
    ResourceDescriptor {
        uri: "typst://v1/packages/{name}/{version}",
        name: "package",
        description: "Package documentation summary (fetched if not cached)",
    },
    ResourceDescriptor {
        uri: "typst://v1/packages/{name}/{version}/readme",
        name: "package_readme",
        description: "Full README of a package version",
    },
    ResourceDescriptor {
        uri: "typst://v1/packages/{name}/{version}/examples",
        name: "package_examples",
        description: "Example files of a package version",
    },
    ResourceDescriptor {
        uri: "typst://v1/packages/{name}/{version}/examples/{filename}",
        name: "package_example_file",
        description: "One example file",
    },
    ResourceDescriptor {
        uri: "typst://v1/packages/{name}/{version}/docs",
        name: "package_docs_list",
        description: "Documentation files of a package version",
    },
    ResourceDescriptor {
        uri: "typst://v1/packages/{name}/{version}/docs/{filename}",
        name: "package_doc_file",
        description: "One documentation file",
    },
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceRoute {
    Root,
    DocsIndex,
    PackagesIndex,
    DocsChapters,
    DocsChapter { route: String },
    CachedPackages,
    Package { package: String, version: String },
    Readme { package: String, version: String },
    Examples { package: String, version: String },
    Example { package: String, version: String, filename: String },
    DocFiles { package: String, version: String },
    DocFile { package: String, version: String, filename: String },
}

impl ResourceRoute {
    pub fn parse(uri: &str) -> Option<Self> {
        let rest = uri.strip_prefix(URI_PREFIX)?.trim_end_matches('/');
        let segments: Vec<&str> = if rest.is_empty() {
            Vec::new()
        } else {
            rest.split('/').collect()
        };
        if segments.iter().any(|segment| segment.is_empty()) {
            return None;
        }

        let route = match segments.as_slice() {
            [] => ResourceRoute::Root,
            ["docs"] => ResourceRoute::DocsIndex,
            ["docs", "chapters"] => ResourceRoute::DocsChapters,
            ["docs", "chapters", route @ ..] => ResourceRoute::DocsChapter {
                route: route.join("/"),
            },
            ["packages"] => ResourceRoute::PackagesIndex,
            ["packages", "cached"] => ResourceRoute::CachedPackages,
            ["packages", package, version, tail @ ..] => {
                let package = (*package).to_string();
                let version = (*version).to_string();
                match tail {
                    [] => ResourceRoute::Package { package, version },
                    ["readme"] => ResourceRoute::Readme { package, version },
                    ["examples"] => ResourceRoute::Examples { package, version },
                    ["examples", file @ ..] => ResourceRoute::Example {
                        package,
                        version,
                        filename: file.join("/"),
                    },
                    ["docs"] => ResourceRoute::DocFiles { package, version },
                    ["docs", file @ ..] => ResourceRoute::DocFile {
                        package,
                        version,
                        filename: file.join("/"),
                    },
                    _ => return None,
                }
            }
            _ => return None,
        };
        Some(route)
    }

    /// Counter name used in telemetry.
    pub fn name(&self) -> &'static str {
        match self {
            ResourceRoute::Root => "root_index",
            ResourceRoute::DocsIndex => "docs_namespace",
            ResourceRoute::PackagesIndex => "packages_namespace",
            ResourceRoute::DocsChapters => "docs_chapters",
            ResourceRoute::DocsChapter { .. } => "docs_chapter",
            ResourceRoute::CachedPackages => "packages_cached",
            ResourceRoute::Package { .. } => "package",
            ResourceRoute::Readme { .. } => "package_readme",
            ResourceRoute::Examples { .. } => "package_examples",
            ResourceRoute::Example { .. } => "package_example_file",
            ResourceRoute::DocFiles { .. } => "package_docs_list",
            ResourceRoute::DocFile { .. } => "package_doc_file",
        }
    }

    /// The package and version addressed, for package routes.
    pub fn package(&self) -> Option<(&str, &str)> {
        match self {
            ResourceRoute::Package { package, version }
            | ResourceRoute::Readme { package, version }
            | ResourceRoute::Examples { package, version }
            | ResourceRoute::Example {
                package, version, ..
            }
            | ResourceRoute::DocFiles { package, version }
            | ResourceRoute::DocFile {
                package, version, ..
            } => Some((package, version)),
            _ => None,
        }
    }
}

fn descriptor_list(descriptors: &[ResourceDescriptor]) -> Vec<Value> {
    descriptors
        .iter()
        .map(|d| json!({"uri": d.uri, "name": d.name, "description": d.description}))
        .collect()
}

pub fn root_index(server_version: &str) -> Value {
    json!({
        "version": "v1",
        "server": "Typst MCP Server",
        "server_version": server_version,
        "namespaces": [
            {
                "name": "docs",
                "uri": "typst://v1/docs/",
                "description": "Typst core documentation chapters",
            },
            {
                "name": "packages",
                "uri": "typst://v1/packages/",
                "description": "Typst Universe package registry and documentation",
            },
        ],
        "note": "Use namespace URIs to discover available resources",
    })
}

pub fn docs_index() -> Value {
    let resources: Vec<Value> = descriptor_list(FIXED_RESOURCES)
        .into_iter()
        .chain(descriptor_list(RESOURCE_TEMPLATES))
        .filter(|entry| {
            entry["uri"]
                .as_str()
                .is_some_and(|uri| uri.starts_with("typst://v1/docs/chapters"))
        })
        .collect();
    json!({"namespace": "docs", "resources": resources})
}

pub fn packages_index() -> Value {
    let resources: Vec<Value> = descriptor_list(FIXED_RESOURCES)
        .into_iter()
        .chain(descriptor_list(RESOURCE_TEMPLATES))
        .filter(|entry| {
            entry["uri"].as_str().is_some_and(|uri| {
                uri.starts_with("typst://v1/packages/") && uri != "typst://v1/packages/"
            })
        })
        .collect();
    json!({"namespace": "packages", "resources": resources})
}

pub fn cached_listing(entries: &[CachedEntry]) -> Value {
    json!({
        "cached_packages": entries,
        "count": entries.len(),
        "note": "These packages are available as resources at typst://v1/packages/{name}/{version}",
    })
}

fn readme_preview(readme: &str) -> String {
    const PREVIEW_CHARS: usize = 500;
    match readme.char_indices().nth(PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}...", &readme[..cut]),
        None => readme.to_string(),
    }
}

pub fn package_summary(document: &CachedDocument) -> Value {
    let examples = document.examples.as_deref().unwrap_or_default();
    let docs = document.docs.as_ref();
    json!({
        "package": document.package,
        "version": document.version,
        "metadata": document.metadata,
        "readme_preview": document.readme.as_deref().map(readme_preview),
        "examples_count": examples.len(),
        "docs_count": docs.map_or(0, |docs| docs.len()),
        "examples_list": examples.iter().map(|example| json!({
            "filename": example.filename,
            "size": example.size,
            "path": format!("examples/{}", example.filename),
        })).collect::<Vec<_>>(),
        "docs_list": docs.into_iter().flatten().map(|(name, content)| json!({
            "filename": name,
            "size": content.len(),
            "path": format!("docs/{name}"),
        })).collect::<Vec<_>>(),
        "import_statement": document.import_statement,
        "universe_url": document.links.universe_url,
        "homepage_url": document.links.homepage_url,
        "complete": document.complete,
        "note": "Use get_package_docs() or get_package_file() tools for full content",
    })
}

pub fn readme(document: &CachedDocument) -> Result<Value> {
    let readme = document.readme.as_ref().ok_or_else(|| {
        ServerError::NotFound(format!(
            "README not available for {}@{}",
            document.package, document.version
        ))
    })?;
    Ok(json!({
        "package": document.package,
        "version": document.version,
        "readme": readme,
        "size": readme.len(),
    }))
}

pub fn examples_list(document: &CachedDocument) -> Value {
    let examples = document.examples.as_deref().unwrap_or_default();
    if examples.is_empty() {
        return json!({
            "package": document.package,
            "version": document.version,
            "examples": [],
            "note": "This package has no examples directory",
        });
    }
    let uri = document.uri();
    json!({
        "package": document.package,
        "version": document.version,
        "examples": examples.iter().map(|example| json!({
            "filename": example.filename,
            "size": example.size,
            "uri": format!("{uri}/examples/{}", example.filename),
        })).collect::<Vec<_>>(),
        "count": examples.len(),
    })
}

pub fn example_file(document: &CachedDocument, filename: &str) -> Result<Value> {
    let examples = document.examples.as_deref().unwrap_or_default();
    let example = examples
        .iter()
        .find(|example| example.filename == filename)
        .ok_or_else(|| {
            let available: Vec<&str> = examples.iter().map(|e| e.filename.as_str()).collect();
            ServerError::NotFound(format!(
                "Example '{filename}' not found in {}@{}. Available examples: {}",
                document.package,
                document.version,
                available_list(&available)
            ))
        })?;
    Ok(json!({
        "package": document.package,
        "version": document.version,
        "filename": filename,
        "content": example.content,
        "size": example.size,
    }))
}

pub fn docs_list(document: &CachedDocument) -> Value {
    let Some(docs) = document.docs.as_ref().filter(|docs| !docs.is_empty()) else {
        return json!({
            "package": document.package,
            "version": document.version,
            "docs": [],
            "note": "This package has no docs directory",
        });
    };
    let uri = document.uri();
    json!({
        "package": document.package,
        "version": document.version,
        "docs": docs.iter().map(|(name, content)| json!({
            "filename": name,
            "size": content.len(),
            "uri": format!("{uri}/docs/{name}"),
        })).collect::<Vec<_>>(),
        "count": docs.len(),
    })
}

pub fn doc_file(document: &CachedDocument, filename: &str) -> Result<Value> {
    let content = document
        .docs
        .as_ref()
        .and_then(|docs| docs.get(filename))
        .ok_or_else(|| {
            let available: Vec<&str> = document
                .docs
                .iter()
                .flat_map(|docs| docs.keys().map(String::as_str))
                .collect();
            ServerError::NotFound(format!(
                "Documentation file '{filename}' not found in {}@{}. Available docs: {}",
                document.package,
                document.version,
                available_list(&available)
            ))
        })?;
    Ok(json!({
        "package": document.package,
        "version": document.version,
        "filename": filename,
        "content": content,
        "size": content.len(),
    }))
}

fn available_list(names: &[&str]) -> String {
    if names.is_empty() {
        "none".to_string()
    } else {
        names.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;
    use typst_mcp_package_docs::DocumentLinks;
    use typst_mcp_registry::ExampleFile;
    use typst_mcp_registry::PackageMetadata;

    fn document() -> CachedDocument {
        let metadata = PackageMetadata::from_manifest(
            "cetz",
            "0.3.1",
            "[package]\nname = \"cetz\"\nversion = \"0.3.1\"\nentrypoint = \"src/lib.typ\"\n",
        );
        CachedDocument {
            package: "cetz".to_string(),
            version: "0.3.1".to_string(),
            links: DocumentLinks::for_package("cetz", "0.3.1", &metadata),
            metadata,
            readme: Some("r".repeat(600)),
            license: None,
            changelog: None,
            examples: Some(vec![ExampleFile {
                filename: "plot.typ".to_string(),
                content: "#plot()".to_string(),
                size: 7,
            }]),
            docs: Some(BTreeMap::from([(
                "manual.md".to_string(),
                "# Manual".to_string(),
            )])),
            import_statement: "#import \"@preview/cetz:0.3.1\": *".to_string(),
            fetched_at: Utc::now(),
            complete: true,
        }
    }

    #[test]
    fn fixed_uris_parse() {
        assert_eq!(ResourceRoute::parse("typst://v1/"), Some(ResourceRoute::Root));
        assert_eq!(ResourceRoute::parse("typst://v1/docs/"), Some(ResourceRoute::DocsIndex));
        assert_eq!(
            ResourceRoute::parse("typst://v1/packages/cached"),
            Some(ResourceRoute::CachedPackages)
        );
        assert_eq!(
            ResourceRoute::parse("typst://v1/docs/chapters"),
            Some(ResourceRoute::DocsChapters)
        );
    }

    #[test]
    fn package_uris_parse() {
        assert_eq!(
            ResourceRoute::parse("typst://v1/packages/cetz/0.3.1/examples/plot.typ"),
            Some(ResourceRoute::Example {
                package: "cetz".to_string(),
                version: "0.3.1".to_string(),
                filename: "plot.typ".to_string(),
            })
        );
        let route = ResourceRoute::parse("typst://v1/packages/cetz/0.3.1").expect("route");
        assert_eq!(route.package(), Some(("cetz", "0.3.1")));
        assert_eq!(route.name(), "package");
        assert_eq!(
            ResourceRoute::parse("typst://v1/docs/chapters/reference____layout"),
            Some(ResourceRoute::DocsChapter {
                route: "reference____layout".to_string()
            })
        );
    }

    #[test]
    fn malformed_uris_are_rejected() {
        assert_eq!(ResourceRoute::parse("file:///etc/passwd"), None);
        assert_eq!(ResourceRoute::parse("typst://v1/packages/cetz"), None);
        assert_eq!(ResourceRoute::parse("typst://v1/packages/cetz/0.3.1/license"), None);
        assert_eq!(ResourceRoute::parse("typst://v1/packages//0.3.1"), None);
    }

    #[test]
    fn namespace_indexes_list_their_resources() {
        let docs = docs_index();
        assert_eq!(docs["resources"].as_array().map(Vec::len), Some(2));
        let packages = packages_index();
        assert_eq!(packages["resources"].as_array().map(Vec::len), Some(7));
        assert_eq!(root_index("1.2.3")["server_version"], "1.2.3");
    }

    #[test]
    fn summary_lists_files_and_previews_readme() {
        let summary = package_summary(&document());
        assert_eq!(summary["examples_count"], 1);
        assert_eq!(summary["docs_list"][0]["path"], "docs/manual.md");
        assert_eq!(
            summary["readme_preview"].as_str().map(str::len),
            Some(503)
        );
    }

    #[test]
    fn file_listings_carry_resource_uris() {
        let document = document();
        assert_eq!(
            examples_list(&document)["examples"][0]["uri"],
            "typst://v1/packages/cetz/0.3.1/examples/plot.typ"
        );
        assert_eq!(
            docs_list(&document)["docs"][0]["uri"],
            "typst://v1/packages/cetz/0.3.1/docs/manual.md"
        );
    }

    #[test]
    fn missing_files_name_the_alternatives() {
        let document = document();
        let err = example_file(&document, "nope.typ").expect_err("missing");
        assert!(err.to_string().contains("Available examples: plot.typ"));
        let err = doc_file(&document, "nope.md").expect_err("missing");
        assert!(err.to_string().contains("Available docs: manual.md"));
        assert_eq!(doc_file(&document, "manual.md").expect("doc")["size"], 8);
    }
}
