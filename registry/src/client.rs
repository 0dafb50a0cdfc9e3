use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use url::Url;

use crate::error::RegistryError;
use crate::error::Result;
use crate::fetch::MAX_FILE_BYTES;
use crate::fetch::MAX_LISTING_BYTES;
use crate::identifier::validate_file_path;
use crate::identifier::validate_package_name;
use crate::identifier::validate_query;
use crate::identifier::validate_version;
use crate::identifier::version_sort_key;
use crate::metadata::PackageMetadata;
use crate::transport::HttpTransport;
use crate::transport::RegistryTransport;
use crate::transport::TransportResponse;

pub const DEFAULT_API_BASE: &str =
    "https://api.github.com/repos/typst/packages/contents/packages/preview";
pub const DEFAULT_RAW_BASE: &str =
    "https://raw.githubusercontent.com/typst/packages/main/packages/preview";

const EXAMPLE_EXTENSIONS: &[&str] = &[".typ"];
const DOC_EXTENSIONS: &[&str] = &[".md", ".txt", ".typ"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryEndpoints {
    /// Directory listings (GitHub contents API).
    pub api_base: String,
    /// Raw file contents.
    pub raw_base: String,
}

impl Default for RegistryEndpoints {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            raw_base: DEFAULT_RAW_BASE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Dir,
    Symlink,
    Submodule,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    pub name: String,
    pub path: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    #[serde(default)]
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExampleFile {
    pub filename: String,
    pub content: String,
    /// Size reported by the directory listing.
    pub size: u64,
}

#[derive(Clone)]
pub struct RegistryClient {
    transport: Arc<dyn RegistryTransport>,
    endpoints: RegistryEndpoints,
}

impl std::fmt::Debug for RegistryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryClient")
            .field("endpoints", &self.endpoints)
            .finish_non_exhaustive()
    }
}

impl RegistryClient {
    pub fn new(transport: Arc<dyn RegistryTransport>) -> Self {
        Self::with_endpoints(transport, RegistryEndpoints::default())
    }

    pub fn with_endpoints(transport: Arc<dyn RegistryTransport>, endpoints: RegistryEndpoints) -> Self {
        Self {
            transport,
            endpoints,
        }
    }

    /// Client over the real network with the given per-request timeout.
    pub fn http(timeout: Duration) -> Result<Self> {
        Ok(Self::new(Arc::new(HttpTransport::new(timeout)?)))
    }

    /// Published versions of `package`, newest first.
    pub async fn list_versions(&self, package: &str) -> Result<Vec<String>> {
        let package = validate_package_name(package)?;
        let url = build_url(&self.endpoints.api_base, &[package])?;
        let entries = self.get_listing(&url, package).await?;

        let mut versions: Vec<String> = entries
            .into_iter()
            .filter(|entry| entry.kind == EntryKind::Dir)
            .filter(|entry| validate_version(&entry.name).is_ok())
            .map(|entry| entry.name)
            .collect();
        versions.sort_by_key(|v| std::cmp::Reverse(version_sort_key(v)));
        Ok(versions)
    }

    /// Contents of one file, or `None` when it is absent or cannot be fetched.
    ///
    /// Validation and security rejections still propagate.
    pub async fn fetch_file(&self, package: &str, version: &str, path: &str) -> Result<Option<String>> {
        let package = validate_package_name(package)?;
        let version = validate_version(version)?;
        let path = validate_file_path(path)?;

        let mut segments = vec![package, version];
        segments.extend(path.split(['/', '\\']).filter(|s| !s.is_empty()));
        let url = build_url(&self.endpoints.raw_base, &segments)?;

        let result = match self.transport.get(&url, MAX_FILE_BYTES).await {
            Ok(response) if response.status == 404 => Ok(None),
            Ok(response) => expect_success(&url, response).and_then(|body| {
                String::from_utf8(body).map(Some).map_err(|err| RegistryError::Decode {
                    url: url.clone(),
                    message: err.to_string(),
                })
            }),
            Err(err) => Err(err),
        };
        degrade(result, &url)
    }

    /// Entries of `dir` within a package version, or `None` when it is absent
    /// or cannot be listed.
    pub async fn list_directory(
        &self,
        package: &str,
        version: &str,
        dir: &str,
    ) -> Result<Option<Vec<DirectoryEntry>>> {
        let package = validate_package_name(package)?;
        let version = validate_version(version)?;
        let dir = validate_file_path(dir)?;

        let mut segments = vec![package, version];
        segments.extend(dir.split(['/', '\\']).filter(|s| !s.is_empty()));
        let url = build_url(&self.endpoints.api_base, &segments)?;

        let result = match self.transport.get(&url, MAX_LISTING_BYTES).await {
            Ok(response) if response.status == 404 => Ok(None),
            Ok(response) => expect_success(&url, response)
                .and_then(|body| decode_listing(&url, &body))
                .map(Some),
            Err(err) => Err(err),
        };
        degrade(result, &url)
    }

    /// `.typ` files under `examples/`, or `None` when there are none.
    pub async fn fetch_examples(
        &self,
        package: &str,
        version: &str,
    ) -> Result<Option<Vec<ExampleFile>>> {
        let files = self
            .fetch_matching(package, version, "examples", EXAMPLE_EXTENSIONS)
            .await?;
        if files.is_empty() {
            return Ok(None);
        }
        Ok(Some(
            files
                .into_iter()
                .map(|(entry, content)| ExampleFile {
                    filename: entry.name,
                    content,
                    size: entry.size,
                })
                .collect(),
        ))
    }

    /// `.md`, `.txt` and `.typ` files under `docs/`, keyed by file name, or
    /// `None` when there are none.
    pub async fn fetch_docs(
        &self,
        package: &str,
        version: &str,
    ) -> Result<Option<BTreeMap<String, String>>> {
        let files = self
            .fetch_matching(package, version, "docs", DOC_EXTENSIONS)
            .await?;
        if files.is_empty() {
            return Ok(None);
        }
        Ok(Some(
            files
                .into_iter()
                .map(|(entry, content)| (entry.name, content))
                .collect(),
        ))
    }

    async fn fetch_matching(
        &self,
        package: &str,
        version: &str,
        dir: &str,
        extensions: &[&str],
    ) -> Result<Vec<(DirectoryEntry, String)>> {
        let Some(entries) = self.list_directory(package, version, dir).await? else {
            return Ok(Vec::new());
        };

        let mut files = Vec::new();
        for entry in entries {
            if entry.kind != EntryKind::File
                || !extensions.iter().any(|ext| entry.name.ends_with(ext))
            {
                continue;
            }
            let path = format!("{dir}/{}", entry.name);
            match self.fetch_file(package, version, &path).await {
                Ok(Some(content)) => files.push((entry, content)),
                Ok(None) => tracing::debug!("skipping {path}: not fetched"),
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => tracing::warn!("skipping {path}: {err}"),
            }
        }
        Ok(files)
    }

    /// `typst.toml` of a package version. A missing or malformed manifest is
    /// reported inside the returned metadata.
    pub async fn fetch_metadata(&self, package: &str, version: &str) -> Result<PackageMetadata> {
        let package = validate_package_name(package)?;
        let version = validate_version(version)?;
        Ok(match self.fetch_file(package, version, "typst.toml").await? {
            Some(manifest) => PackageMetadata::from_manifest(package, version, &manifest),
            None => PackageMetadata::unavailable(package, version, "typst.toml could not be fetched"),
        })
    }

    /// Names of every package in the namespace, sorted.
    pub async fn list_packages(&self) -> Result<Vec<String>> {
        let url = build_url(&self.endpoints.api_base, &[])?;
        let entries = self.get_listing(&url, "package index").await?;
        let mut names: Vec<String> = entries
            .into_iter()
            .filter(|entry| entry.kind == EntryKind::Dir)
            .filter(|entry| validate_package_name(&entry.name).is_ok())
            .map(|entry| entry.name)
            .collect();
        names.sort();
        Ok(names)
    }

    /// Case-insensitive substring search over package names.
    pub async fn search_packages(&self, query: &str, max_results: usize) -> Result<Vec<String>> {
        let needle = validate_query(query)?.trim().to_lowercase();
        let names = self.list_packages().await?;
        Ok(names
            .into_iter()
            .filter(|name| name.contains(&needle))
            .take(max_results)
            .collect())
    }

    async fn get_listing(&self, url: &str, what: &str) -> Result<Vec<DirectoryEntry>> {
        let response = self.transport.get(url, MAX_LISTING_BYTES).await?;
        if response.status == 404 {
            return Err(RegistryError::NotFound {
                what: what.to_string(),
            });
        }
        let body = expect_success(url, response)?;
        decode_listing(url, &body)
    }
}

fn build_url(base: &str, segments: &[&str]) -> Result<String> {
    let mut url = Url::parse(base).map_err(|err| RegistryError::Transport {
        url: base.to_string(),
        message: format!("invalid registry base URL: {err}"),
    })?;
    url.path_segments_mut()
        .map_err(|()| RegistryError::Transport {
            url: base.to_string(),
            message: "registry base URL cannot have path segments".to_string(),
        })?
        .pop_if_empty()
        .extend(segments);
    Ok(url.to_string())
}

fn expect_success(url: &str, response: TransportResponse) -> Result<Vec<u8>> {
    if response.is_success() {
        Ok(response.body)
    } else {
        Err(RegistryError::Transport {
            url: url.to_string(),
            message: format!(
                "HTTP {}: {}",
                response.status,
                String::from_utf8_lossy(&response.body).trim()
            ),
        })
    }
}

fn decode_listing(url: &str, body: &[u8]) -> Result<Vec<DirectoryEntry>> {
    serde_json::from_slice(body).map_err(|err| RegistryError::Decode {
        url: url.to_string(),
        message: err.to_string(),
    })
}

/// Optional content: anything but a fatal error becomes "absent".
fn degrade<T>(result: Result<Option<T>>, url: &str) -> Result<Option<T>> {
    match result {
        Err(err) if err.is_fatal() => Err(err),
        Err(err) => {
            tracing::warn!("treating {url} as absent: {err}");
            Ok(None)
        }
        ok => ok,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;

    #[derive(Default)]
    struct StubTransport {
        responses: HashMap<String, TransportResponse>,
        failures: HashMap<String, u16>,
        calls: AtomicUsize,
    }

    impl StubTransport {
        fn with(mut self, url: &str, body: impl Into<Vec<u8>>) -> Self {
            self.responses
                .insert(url.to_string(), TransportResponse::ok(body));
            self
        }

        fn failing(mut self, url: &str, status: u16) -> Self {
            self.failures.insert(url.to_string(), status);
            self
        }
    }

    #[async_trait]
    impl RegistryTransport for StubTransport {
        async fn get(&self, url: &str, _max_bytes: u64) -> Result<TransportResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(status) = self.failures.get(url) {
                return Ok(TransportResponse {
                    status: *status,
                    body: b"upstream broke".to_vec(),
                });
            }
            Ok(self
                .responses
                .get(url)
                .cloned()
                .unwrap_or_else(TransportResponse::not_found))
        }
    }

    fn api(path: &str) -> String {
        format!("{DEFAULT_API_BASE}/{path}")
    }

    fn raw(path: &str) -> String {
        format!("{DEFAULT_RAW_BASE}/{path}")
    }

    fn dir(name: &str) -> serde_json::Value {
        json!({"name": name, "path": name, "type": "dir", "size": 0})
    }

    fn file(name: &str, size: u64) -> serde_json::Value {
        json!({"name": name, "path": name, "type": "file", "size": size})
    }

    fn client(stub: StubTransport) -> (RegistryClient, Arc<StubTransport>) {
        let stub = Arc::new(stub);
        (RegistryClient::new(stub.clone()), stub)
    }

    #[tokio::test]
    async fn versions_are_sorted_newest_first() {
        let listing = json!([dir("0.2.0"), dir("0.2.2"), file("README.md", 3), dir("0.2.1")]);
        let (client, _) = client(StubTransport::default().with(&api("cetz"), listing.to_string()));

        let versions = client.list_versions("cetz").await.expect("versions");
        assert_eq!(versions, vec!["0.2.2", "0.2.1", "0.2.0"]);
    }

    #[tokio::test]
    async fn unknown_package_is_not_found() {
        let (client, _) = client(StubTransport::default());
        let err = client.list_versions("nope").await.expect_err("404");
        assert!(matches!(err, RegistryError::NotFound { .. }));
    }

    #[tokio::test]
    async fn server_error_on_versions_is_transport_error() {
        let (client, _) = client(StubTransport::default().failing(&api("cetz"), 502));
        let err = client.list_versions("cetz").await.expect_err("502");
        match err {
            RegistryError::Transport { message, .. } => assert!(message.contains("502")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn traversal_path_fails_before_any_request() {
        let (client, stub) = client(StubTransport::default());
        let err = client
            .fetch_file("cetz", "0.2.2", "../../etc/passwd")
            .await
            .expect_err("traversal");
        assert!(matches!(err, RegistryError::Validation(_)));
        assert_eq!(stub.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn optional_files_degrade_to_none() {
        let (client, _) = client(
            StubTransport::default()
                .with(&raw("cetz/0.2.2/README.md"), "# CeTZ")
                .failing(&raw("cetz/0.2.2/LICENSE"), 500),
        );

        assert_eq!(
            client
                .fetch_file("cetz", "0.2.2", "README.md")
                .await
                .expect("readme"),
            Some("# CeTZ".to_string())
        );
        assert_eq!(
            client
                .fetch_file("cetz", "0.2.2", "LICENSE")
                .await
                .expect("license degrades"),
            None
        );
        assert_eq!(
            client
                .fetch_file("cetz", "0.2.2", "CHANGELOG.md")
                .await
                .expect("changelog absent"),
            None
        );
    }

    #[tokio::test]
    async fn examples_keep_only_fetchable_typ_files() {
        let listing = json!([
            file("plot.typ", 10),
            file("notes.md", 4),
            file("broken.typ", 3),
            dir("assets"),
        ]);
        let (client, _) = client(
            StubTransport::default()
                .with(&api("cetz/0.2.2/examples"), listing.to_string())
                .with(&raw("cetz/0.2.2/examples/plot.typ"), "#plot()")
                .failing(&raw("cetz/0.2.2/examples/broken.typ"), 500),
        );

        let examples = client.fetch_examples("cetz", "0.2.2").await.expect("examples");
        assert_eq!(
            examples,
            Some(vec![ExampleFile {
                filename: "plot.typ".to_string(),
                content: "#plot()".to_string(),
                size: 10,
            }])
        );
    }

    #[tokio::test]
    async fn docs_accept_markdown_text_and_typst() {
        let listing = json!([
            file("guide.md", 1),
            file("api.txt", 1),
            file("demo.typ", 1),
            file("logo.png", 1),
        ]);
        let (client, _) = client(
            StubTransport::default()
                .with(&api("cetz/0.2.2/docs"), listing.to_string())
                .with(&raw("cetz/0.2.2/docs/guide.md"), "g")
                .with(&raw("cetz/0.2.2/docs/api.txt"), "a")
                .with(&raw("cetz/0.2.2/docs/demo.typ"), "d")
                .with(&raw("cetz/0.2.2/docs/logo.png"), "p"),
        );

        let docs = client
            .fetch_docs("cetz", "0.2.2")
            .await
            .expect("docs")
            .expect("docs present");
        assert_eq!(
            docs.keys().map(String::as_str).collect::<Vec<_>>(),
            vec!["api.txt", "demo.typ", "guide.md"]
        );
    }

    #[tokio::test]
    async fn empty_or_missing_sections_are_none() {
        let listing = json!([file("notes.md", 4), dir("assets")]);
        let (client, _) = client(
            StubTransport::default().with(&api("cetz/0.2.2/examples"), listing.to_string()),
        );

        assert_eq!(
            client.fetch_examples("cetz", "0.2.2").await.expect("examples"),
            None
        );
        assert_eq!(client.fetch_docs("cetz", "0.2.2").await.expect("docs"), None);
    }

    #[tokio::test]
    async fn missing_directory_is_none() {
        let (client, _) = client(StubTransport::default());
        assert_eq!(
            client
                .list_directory("cetz", "0.2.2", "examples")
                .await
                .expect("listing"),
            None
        );
    }

    #[tokio::test]
    async fn metadata_falls_back_to_error_note() {
        let (client, _) = client(StubTransport::default());
        let metadata = client.fetch_metadata("cetz", "0.2.2").await.expect("metadata");
        assert_eq!(metadata.name, "cetz");
        assert!(metadata.error.is_some());
    }

    #[tokio::test]
    async fn search_filters_package_index() {
        let index = json!([dir("cetz"), dir("cetz-plot"), dir("tablex"), dir("Bad_Name")]);
        let (client, _) = client(StubTransport::default().with(DEFAULT_API_BASE, index.to_string()));

        assert_eq!(
            client.list_packages().await.expect("index"),
            vec!["cetz", "cetz-plot", "tablex"]
        );
        assert_eq!(
            client.search_packages("CETZ", 1).await.expect("search"),
            vec!["cetz"]
        );
    }

    #[test]
    fn urls_escape_path_segments() {
        let url = build_url(DEFAULT_RAW_BASE, &["cetz", "0.2.2", "docs", "a b#c.md"]).expect("url");
        assert_eq!(url, raw("cetz/0.2.2/docs/a%20b%23c.md"));
    }
}
