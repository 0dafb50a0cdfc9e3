use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::Instant;
use typst_mcp_registry::RegistryClient;
use typst_mcp_registry::RegistryError;
use typst_mcp_registry::RegistryIdentifier;
use typst_mcp_sandbox::fs_ops::atomic_write;

use crate::candidates::CHANGELOG_CANDIDATES;
use crate::candidates::LICENSE_CANDIDATES;
use crate::candidates::README_CANDIDATES;
use crate::candidates::first_match;
use crate::document::CachedDocument;
use crate::document::DocumentLinks;
use crate::document::import_statement;
use crate::document::package_uri;
use crate::error::DocsError;
use crate::error::Result;

/// Share of the total timeout after which the optional examples and docs
/// phase is skipped.
pub const DEFAULT_OPTIONAL_BUDGET_RATIO: f64 = 0.7;

const CACHE_SUBDIR: &str = "package-docs";
const CACHE_FILE_MODE: u32 = 0o644;

/// A package version present in the on-disk cache.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct CachedEntry {
    pub package: String,
    pub version: String,
    pub path: PathBuf,
    pub uri: String,
}

/// Memory map in front of `{root}/{package}_{version}.json` files in front of
/// the registry. Entries are never invalidated: a published version's files
/// are assumed not to change.
#[derive(Debug)]
pub struct DocumentCache {
    registry: RegistryClient,
    root: PathBuf,
    optional_budget_ratio: f64,
    memory: Mutex<HashMap<String, Arc<CachedDocument>>>,
}

impl DocumentCache {
    /// `cache_root` is the application cache directory; documents live in its
    /// `package-docs` subdirectory.
    pub fn new(registry: RegistryClient, cache_root: &Path) -> Self {
        Self {
            registry,
            root: cache_root.join(CACHE_SUBDIR),
            optional_budget_ratio: DEFAULT_OPTIONAL_BUDGET_RATIO,
            memory: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_optional_budget_ratio(mut self, ratio: f64) -> Self {
        self.optional_budget_ratio = ratio;
        self
    }

    pub fn registry(&self) -> &RegistryClient {
        &self.registry
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the document for `package` at `version` (newest when `None`),
    /// building and caching it if needed. Fails with [`DocsError::Timeout`]
    /// when the whole operation, including version resolution, exceeds
    /// `timeout`.
    pub async fn get_or_build(
        &self,
        package: &str,
        version: Option<&str>,
        timeout: Duration,
    ) -> Result<Arc<CachedDocument>> {
        let start = Instant::now();
        match tokio::time::timeout(timeout, self.resolve_and_build(package, version, start, timeout))
            .await
        {
            Ok(result) => result,
            Err(_) => {
                let elapsed = start.elapsed();
                tracing::warn!("documentation for {package} timed out after {elapsed:?}");
                Err(DocsError::Timeout {
                    package: package.to_string(),
                    elapsed,
                })
            }
        }
    }

    async fn resolve_and_build(
        &self,
        package: &str,
        version: Option<&str>,
        start: Instant,
        timeout: Duration,
    ) -> Result<Arc<CachedDocument>> {
        let version = match version {
            Some(version) => version.to_string(),
            None => {
                let versions = self.registry.list_versions(package).await?;
                versions
                    .into_iter()
                    .next()
                    .ok_or_else(|| RegistryError::NotFound {
                        what: format!("published versions of {package}"),
                    })?
            }
        };
        let id = RegistryIdentifier::new(package, &version, None)
            .map_err(RegistryError::from)?;

        if let Some(document) = self.lookup(&id).await {
            return Ok(document);
        }

        let document = self.aggregate(&id, start, timeout).await?;
        let document = Arc::new(document);
        if document.complete {
            self.persist(&document).await;
            self.memory
                .lock()
                .await
                .insert(id.cache_key(), Arc::clone(&document));
        } else {
            tracing::info!(
                "not caching partial documentation for {}",
                id.cache_key()
            );
        }
        Ok(document)
    }

    /// Memory, then disk. Never touches the network.
    pub async fn get_cached(&self, package: &str, version: &str) -> Option<Arc<CachedDocument>> {
        let id = RegistryIdentifier::new(package, version, None).ok()?;
        self.lookup(&id).await
    }

    async fn lookup(&self, id: &RegistryIdentifier) -> Option<Arc<CachedDocument>> {
        let key = id.cache_key();
        if let Some(document) = self.memory.lock().await.get(&key) {
            return Some(Arc::clone(document));
        }

        let document = Arc::new(self.load_from_disk(id).await?);
        self.memory
            .lock()
            .await
            .insert(key, Arc::clone(&document));
        Some(document)
    }

    async fn load_from_disk(&self, id: &RegistryIdentifier) -> Option<CachedDocument> {
        let path = self.file_path(id.package(), id.version());
        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return None,
            Err(err) => {
                tracing::warn!("failed to read {}: {err}", path.display());
                return None;
            }
        };
        match serde_json::from_str::<CachedDocument>(&contents) {
            Ok(document) if document.package == id.package() && document.version == id.version() => {
                tracing::debug!("loaded {} from disk cache", id.cache_key());
                Some(document)
            }
            Ok(_) => {
                tracing::warn!("{} does not describe {}; ignoring", path.display(), id.cache_key());
                None
            }
            Err(err) => {
                tracing::warn!("ignoring unreadable cache file {}: {err}", path.display());
                None
            }
        }
    }

    async fn aggregate(
        &self,
        id: &RegistryIdentifier,
        start: Instant,
        timeout: Duration,
    ) -> Result<CachedDocument> {
        let (package, version) = (id.package(), id.version());
        tracing::info!("aggregating documentation for {}", id.cache_key());

        let metadata = self.registry.fetch_metadata(package, version).await?;
        let readme = self.first_file(package, version, README_CANDIDATES).await?;
        let license = self.first_file(package, version, LICENSE_CANDIDATES).await?;
        let changelog = self.first_file(package, version, CHANGELOG_CANDIDATES).await?;

        let optional_budget = timeout.mul_f64(self.optional_budget_ratio);
        let (examples, docs, complete) = if start.elapsed() > optional_budget {
            tracing::warn!(
                "skipping examples and docs for {}: {:?} of {timeout:?} already used",
                id.cache_key(),
                start.elapsed()
            );
            (None, None, false)
        } else {
            let examples = self.registry.fetch_examples(package, version).await?;
            let docs = self.registry.fetch_docs(package, version).await?;
            (examples, docs, true)
        };

        let elapsed = start.elapsed();
        if elapsed > timeout {
            return Err(DocsError::Timeout {
                package: package.to_string(),
                elapsed,
            });
        }

        Ok(CachedDocument {
            package: package.to_string(),
            version: version.to_string(),
            links: DocumentLinks::for_package(package, version, &metadata),
            import_statement: import_statement(package, version),
            metadata,
            readme,
            license,
            changelog,
            examples,
            docs,
            fetched_at: Utc::now(),
            complete,
        })
    }

    async fn first_file(
        &self,
        package: &str,
        version: &str,
        candidates: &[&'static str],
    ) -> Result<Option<String>> {
        let found = first_match(candidates, |name| {
            self.registry.fetch_file(package, version, name)
        })
        .await?;
        Ok(found.map(|(_, content)| content))
    }

    /// Best effort: a failed write only costs a rebuild in a later process.
    async fn persist(&self, document: &CachedDocument) {
        let path = self.file_path(&document.package, &document.version);
        let result = match serde_json::to_vec_pretty(document) {
            Ok(bytes) => {
                let root = self.root.clone();
                let target = path.clone();
                tokio::task::spawn_blocking(move || {
                    std::fs::create_dir_all(&root)?;
                    atomic_write(&target, &bytes, CACHE_FILE_MODE)
                })
                .await
                .map_err(std::io::Error::other)
                .and_then(|inner| inner)
                .map_err(|source| DocsError::Cache {
                    path: path.clone(),
                    source,
                })
            }
            Err(err) => Err(err.into()),
        };
        match result {
            Ok(()) => tracing::debug!("cached {} at {}", document.cache_key(), path.display()),
            Err(err) => tracing::warn!("failed to cache {}: {err}", document.cache_key()),
        }
    }

    /// Package versions present on disk, sorted by package then version.
    pub async fn list_cached(&self) -> Result<Vec<CachedEntry>> {
        let mut dir = match tokio::fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(DocsError::Cache {
                    path: self.root.clone(),
                    source,
                });
            }
        };

        let mut entries = Vec::new();
        loop {
            let entry = match dir.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(source) => {
                    return Err(DocsError::Cache {
                        path: self.root.clone(),
                        source,
                    });
                }
            };
            let path = entry.path();
            if let Some((package, version)) = parse_cache_file_name(&path) {
                entries.push(CachedEntry {
                    uri: package_uri(&package, &version),
                    package,
                    version,
                    path,
                });
            }
        }
        entries.sort();
        Ok(entries)
    }

    fn file_path(&self, package: &str, version: &str) -> PathBuf {
        self.root.join(format!("{package}_{version}.json"))
    }
}

/// `{package}_{version}.json`. Package names cannot contain `_`, so the first
/// underscore separates the two.
fn parse_cache_file_name(path: &Path) -> Option<(String, String)> {
    if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    let (package, version) = stem.split_once('_')?;
    RegistryIdentifier::new(package, version, None).ok()?;
    Some((package.to_string(), version.to_string()))
}
