use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use rmcp::ErrorData as McpError;
use rmcp::RoleServer;
use rmcp::ServerHandler;
use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::CallToolResult;
use rmcp::model::Content;
use rmcp::model::Implementation;
use rmcp::model::ListResourceTemplatesResult;
use rmcp::model::ListResourcesResult;
use rmcp::model::PaginatedRequestParam;
use rmcp::model::ProtocolVersion;
use rmcp::model::RawResource;
use rmcp::model::RawResourceTemplate;
use rmcp::model::ReadResourceRequestParam;
use rmcp::model::ReadResourceResult;
use rmcp::model::Resource;
use rmcp::model::ResourceContents;
use rmcp::model::ResourceTemplate;
use rmcp::model::ServerCapabilities;
use rmcp::model::ServerInfo;
use rmcp::schemars;
use rmcp::service::RequestContext;
use rmcp::tool;
use rmcp::tool_handler;
use rmcp::tool_router;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;
use typst_mcp_package_docs::CachedDocument;
use typst_mcp_package_docs::PackageDocsSummary;
use typst_mcp_sandbox::SessionState;

use crate::context::AppContext;
use crate::convert::VALID;
use crate::docs_bundle::DocsState;
use crate::docs_chapters;
use crate::error::ServerError;
use crate::render;
use crate::resources;
use crate::resources::JSON_MIME;
use crate::resources::ResourceRoute;

const MAX_SEARCH_RESULTS: usize = 100;
const DEFAULT_LIST_LIMIT: usize = 100;
const MAX_LIST_LIMIT: usize = 1000;
const EMBEDDED_PDF_URI: &str = "file:///document.pdf";

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct LatexParams {
    /// LaTeX code to convert (max 50KB).
    pub latex_snippet: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct LatexBatchParams {
    /// LaTeX snippets to convert, each at most 50KB.
    pub latex_snippets: Vec<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct TypstParams {
    /// Typst code (max 100KB).
    pub typst_snippet: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct TypstBatchParams {
    /// Typst snippets, each at most 100KB.
    pub typst_snippets: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum PdfOutputMode {
    /// Return the PDF inline as a base64 resource.
    #[default]
    Embedded,
    /// Write the PDF to disk and return its path.
    Path,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct PdfParams {
    /// Typst code to compile (max 100KB).
    pub typst_snippet: String,
    #[serde(default)]
    pub output_mode: PdfOutputMode,
    /// Destination for `path` mode. Must be inside an allowed write
    /// directory; omitted means an auto-named file in the temp directory.
    pub output_path: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct SearchParams {
    /// Case-insensitive substring of the package name.
    pub query: String,
    /// Between 1 and 100.
    pub max_results: Option<usize>,
}

#[derive(Debug, Default, Deserialize, schemars::JsonSchema)]
pub struct ListPackagesParams {
    /// Number of packages to skip.
    pub offset: Option<usize>,
    /// Between 1 and 1000, default 100.
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct PackageParams {
    /// Package name, e.g. "cetz".
    pub package_name: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct PackageDocsParams {
    /// Package name, e.g. "cetz".
    pub package_name: String,
    /// Version; the newest published version when omitted.
    pub version: Option<String>,
    /// Return metadata, previews and file listings instead of full content.
    #[serde(default)]
    pub summary: bool,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct PackageFileParams {
    pub package_name: String,
    pub version: String,
    /// Path inside the package, e.g. "examples/plot.typ".
    pub file_path: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct ChapterParams {
    /// Chapter route using ____ as the path separator, e.g.
    /// "____reference____layout____colbreak".
    pub route: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct ChaptersParams {
    pub routes: Vec<String>,
}

#[derive(Debug, Serialize)]
struct SearchHit {
    name: String,
    url: String,
    import: String,
}

#[derive(Debug, Serialize)]
struct PackagePage {
    packages: Vec<String>,
    total: usize,
    offset: usize,
    limit: usize,
    has_more: bool,
}

fn text_result(text: impl Into<String>) -> CallToolResult {
    CallToolResult::success(vec![Content::text(text)])
}

fn json_result<T: Serialize>(value: &T) -> Result<CallToolResult, ServerError> {
    Ok(text_result(serde_json::to_string_pretty(value)?))
}

fn paginate(all: Vec<String>, offset: usize, limit: usize) -> PackagePage {
    let total = all.len();
    let end = offset.saturating_add(limit);
    PackagePage {
        packages: all.into_iter().skip(offset).take(limit).collect(),
        total,
        offset,
        limit,
        has_more: end < total,
    }
}

/// Server instructions, including where PDFs may be written.
pub fn instructions(context: &AppContext) -> String {
    let mut text = String::from(
        "Tools for writing Typst: convert LaTeX to Typst, check Typst syntax, render Typst to \
         PNG or PDF, browse the Typst documentation and Typst Universe packages.\n\n",
    );
    match context.session.state() {
        SessionState::ExternallyInstalled | SessionState::AutoFetched => {
            text.push_str(
                "External tools run in an OS sandbox. typst_snippet_to_pdf with output_mode=\"path\" \
                 may only write inside these directories:\n",
            );
            for path in &context.session.policy().allowed_write_paths {
                text.push_str(&format!("  - {}\n", path.display()));
            }
            text.push_str("Use output_mode=\"embedded\" to receive the PDF inline instead.");
        }
        SessionState::Disabled => text.push_str(
            "WARNING: the sandbox was disabled with --disable-sandbox. External tools run without \
             filesystem or network restrictions; only timeouts and pandoc --sandbox apply.",
        ),
        SessionState::Unavailable | SessionState::Uninitialized => text.push_str(
            "The sandbox helper is unavailable on this machine. External tools run with timeouts \
             only.",
        ),
    }
    text
}

#[derive(Clone)]
pub struct TypstServer {
    tool_router: ToolRouter<TypstServer>,
    context: Arc<AppContext>,
}

impl TypstServer {
    /// Counts the call and, on failure, the error before converting it for
    /// the protocol.
    async fn track<F>(&self, tool: &'static str, work: F) -> Result<CallToolResult, McpError>
    where
        F: Future<Output = Result<CallToolResult, ServerError>>,
    {
        self.context.telemetry.record_tool_call(tool);
        work.await.map_err(|err| {
            self.context.telemetry.record_error(tool);
            tracing::warn!("{tool} failed: {err}");
            McpError::from(err)
        })
    }

    fn package_timeout(&self) -> Duration {
        self.context.config.package_fetch_timeout()
    }

    async fn document(
        &self,
        package: &str,
        version: Option<&str>,
    ) -> Result<Arc<CachedDocument>, ServerError> {
        Ok(self
            .context
            .documents
            .get_or_build(package, version, self.package_timeout())
            .await?)
    }

    async fn docs(&self) -> Result<Arc<Vec<Value>>, ServerError> {
        self.context
            .docs
            .get(self.context.config.docs_wait_timeout())
            .await
    }

    async fn with_timeout<T, F>(&self, what: &'static str, work: F) -> Result<T, ServerError>
    where
        F: Future<Output = Result<T, ServerError>>,
    {
        let after = self.package_timeout();
        tokio::time::timeout(after, work)
            .await
            .map_err(|_| ServerError::Timeout { what, after })?
    }

    async fn check_one(&self, snippet: &str) -> Result<String, ServerError> {
        self.context.converter.check_syntax(snippet).await
    }

    async fn resource_body(&self, route: &ResourceRoute) -> Result<Value, ServerError> {
        if let Some((package, version)) = route.package() {
            let document = self.document(package, Some(version)).await?;
            return match route {
                ResourceRoute::Readme { .. } => resources::readme(&document),
                ResourceRoute::Examples { .. } => Ok(resources::examples_list(&document)),
                ResourceRoute::Example { filename, .. } => {
                    resources::example_file(&document, filename)
                }
                ResourceRoute::DocFiles { .. } => Ok(resources::docs_list(&document)),
                ResourceRoute::DocFile { filename, .. } => resources::doc_file(&document, filename),
                _ => Ok(resources::package_summary(&document)),
            };
        }
        match route {
            ResourceRoute::Root => Ok(resources::root_index(env!("CARGO_PKG_VERSION"))),
            ResourceRoute::DocsIndex => Ok(resources::docs_index()),
            ResourceRoute::PackagesIndex => Ok(resources::packages_index()),
            ResourceRoute::CachedPackages => {
                let entries = self.context.documents.list_cached().await?;
                Ok(resources::cached_listing(&entries))
            }
            ResourceRoute::DocsChapters => {
                let docs = self.docs().await?;
                Ok(serde_json::to_value(docs_chapters::list_chapters(&docs))?)
            }
            ResourceRoute::DocsChapter { route } => {
                let docs = self.docs().await?;
                docs_chapters::get_chapter(&docs, route)
            }
            _ => Err(ServerError::NotFound("Unknown resource".to_string())),
        }
    }

    fn health(&self) -> Value {
        let docs_state = self.context.docs.state();
        let docs_error = match &docs_state {
            DocsState::Failed(reason) => Some(reason.clone()),
            _ => None,
        };
        let session = &self.context.session;
        json!({
            "status": "healthy",
            "version": env!("CARGO_PKG_VERSION"),
            "server_name": "Typst MCP Server",
            "docs_status": {
                "state": docs_state.label(),
                "loaded": matches!(docs_state, DocsState::Ready(_)),
                "building": matches!(docs_state, DocsState::Building),
                "error": docs_error,
            },
            "sandbox": {
                "state": session.state(),
                "method": session.method(),
                "enforced": session.is_enforced(),
                "protection": session.protection_state(),
            },
            "sandbox_enabled": session.is_enforced(),
            "uptime_seconds": (self.context.telemetry.uptime().as_secs_f64() * 100.0).round() / 100.0,
        })
    }
}

#[tool_router]
impl TypstServer {
    pub fn new(context: Arc<AppContext>) -> Self {
        Self {
            tool_router: Self::tool_router(),
            context,
        }
    }

    /// Converts LaTeX to Typst with Pandoc. Useful because models are often
    /// better at writing LaTeX than Typst. Returns the Typst code.
    #[tool]
    async fn latex_snippet_to_typst(
        &self,
        Parameters(params): Parameters<LatexParams>,
    ) -> Result<CallToolResult, McpError> {
        self.track("latex_snippet_to_typst", async move {
            let typst = self
                .context
                .converter
                .latex_to_typst(&params.latex_snippet)
                .await?;
            Ok(text_result(typst))
        })
        .await
    }

    /// Converts several LaTeX snippets to Typst. Returns a JSON list; failed
    /// conversions appear as "ERROR: ..." entries.
    #[tool]
    async fn latex_snippets_to_typst(
        &self,
        Parameters(params): Parameters<LatexBatchParams>,
    ) -> Result<CallToolResult, McpError> {
        self.track("latex_snippets_to_typst", async move {
            let mut results = Vec::with_capacity(params.latex_snippets.len());
            for snippet in &params.latex_snippets {
                match self.context.converter.latex_to_typst(snippet).await {
                    Ok(typst) => results.push(typst),
                    Err(err) => results.push(format!("ERROR: {err}")),
                }
            }
            json_result(&results)
        })
        .await
    }

    /// Checks whether Typst code compiles. Returns "VALID" or
    /// "INVALID! Error message: ..." with the compiler diagnostics; fix the
    /// code and check again when invalid.
    #[tool]
    async fn check_if_snippet_is_valid_typst_syntax(
        &self,
        Parameters(params): Parameters<TypstParams>,
    ) -> Result<CallToolResult, McpError> {
        self.track("check_if_snippet_is_valid_typst_syntax", async move {
            Ok(text_result(self.check_one(&params.typst_snippet).await?))
        })
        .await
    }

    /// Checks several Typst snippets. Returns a JSON list of "VALID" or
    /// "INVALID! ..." results.
    #[tool]
    async fn check_if_snippets_are_valid_typst_syntax(
        &self,
        Parameters(params): Parameters<TypstBatchParams>,
    ) -> Result<CallToolResult, McpError> {
        self.track("check_if_snippets_are_valid_typst_syntax", async move {
            let mut results = Vec::with_capacity(params.typst_snippets.len());
            for snippet in &params.typst_snippets {
                results.push(self.check_one(snippet).await?);
            }
            let valid = results.iter().filter(|r| r.as_str() == VALID).count();
            tracing::debug!("validated {} snippets, {valid} valid", results.len());
            json_result(&results)
        })
        .await
    }

    /// Renders Typst code to a single PNG. Pages are cropped to their content
    /// with 10px padding and stacked vertically.
    #[tool]
    async fn typst_snippet_to_image(
        &self,
        Parameters(params): Parameters<TypstParams>,
    ) -> Result<CallToolResult, McpError> {
        self.track("typst_snippet_to_image", async move {
            let pages = self
                .context
                .converter
                .render_pages(&params.typst_snippet)
                .await?;
            let png = tokio::task::spawn_blocking(move || render::stack_pages(&pages))
                .await
                .map_err(|err| ServerError::Image(err.to_string()))??;
            Ok(CallToolResult::success(vec![Content::image(
                BASE64_STANDARD.encode(png),
                "image/png",
            )]))
        })
        .await
    }

    /// Compiles Typst code to PDF. output_mode "embedded" (default) returns
    /// the PDF inline; "path" writes it to output_path, or to an auto-named
    /// file in the temp directory, and returns the absolute path.
    #[tool]
    async fn typst_snippet_to_pdf(
        &self,
        Parameters(params): Parameters<PdfParams>,
    ) -> Result<CallToolResult, McpError> {
        self.track("typst_snippet_to_pdf", async move {
            let compiled = self
                .context
                .converter
                .compile_pdf(&params.typst_snippet)
                .await?;
            let max = self.context.config.max_pdf_bytes();
            if compiled.size > max {
                return Err(ServerError::PdfTooLarge {
                    size: compiled.size,
                    max,
                });
            }
            match params.output_mode {
                PdfOutputMode::Embedded => {
                    let bytes = compiled.read().await?;
                    Ok(CallToolResult::success(vec![Content::resource(
                        ResourceContents::BlobResourceContents {
                            uri: EMBEDDED_PDF_URI.to_string(),
                            mime_type: Some("application/pdf".to_string()),
                            blob: BASE64_STANDARD.encode(bytes),
                            meta: None,
                        },
                    )]))
                }
                PdfOutputMode::Path => {
                    let path = self
                        .context
                        .pdf_output
                        .place(
                            &self.context.session,
                            &compiled.path,
                            params.output_path.as_deref(),
                        )
                        .await?;
                    Ok(text_result(path.to_string_lossy()))
                }
            }
        })
        .await
    }

    /// Searches Typst Universe package names.
    #[tool]
    async fn search_packages(
        &self,
        Parameters(params): Parameters<SearchParams>,
    ) -> Result<CallToolResult, McpError> {
        self.track("search_packages", async move {
            let max = params
                .max_results
                .unwrap_or(self.context.config.package_search_max_results)
                .clamp(1, MAX_SEARCH_RESULTS);
            let names = self
                .with_timeout("Package search", async {
                    Ok(self
                        .context
                        .documents
                        .registry()
                        .search_packages(&params.query, max)
                        .await?)
                })
                .await?;
            let hits: Vec<SearchHit> = names
                .into_iter()
                .map(|name| SearchHit {
                    url: format!("https://typst.app/universe/package/{name}/"),
                    import: format!("@preview/{name}"),
                    name,
                })
                .collect();
            json_result(&hits)
        })
        .await
    }

    /// Lists Typst Universe packages with offset/limit pagination.
    #[tool]
    async fn list_packages(
        &self,
        Parameters(params): Parameters<ListPackagesParams>,
    ) -> Result<CallToolResult, McpError> {
        self.track("list_packages", async move {
            let offset = params.offset.unwrap_or(0);
            let limit = params
                .limit
                .unwrap_or(DEFAULT_LIST_LIMIT)
                .clamp(1, MAX_LIST_LIMIT);
            let all = self
                .with_timeout("Package listing", async {
                    Ok(self.context.documents.registry().list_packages().await?)
                })
                .await?;
            json_result(&paginate(all, offset, limit))
        })
        .await
    }

    /// Lists the published versions of a package, newest first.
    #[tool]
    async fn get_package_versions(
        &self,
        Parameters(params): Parameters<PackageParams>,
    ) -> Result<CallToolResult, McpError> {
        self.track("get_package_versions", async move {
            let versions = self
                .with_timeout("Version lookup", async {
                    Ok(self
                        .context
                        .documents
                        .registry()
                        .list_versions(&params.package_name)
                        .await?)
                })
                .await?;
            json_result(&versions)
        })
        .await
    }

    /// Fetches documentation for a package version (newest when version is
    /// omitted). summary=true returns metadata, a README preview and file
    /// listings; summary=false returns every file in full.
    #[tool]
    async fn get_package_docs(
        &self,
        Parameters(params): Parameters<PackageDocsParams>,
    ) -> Result<CallToolResult, McpError> {
        self.track("get_package_docs", async move {
            let document = self
                .document(&params.package_name, params.version.as_deref())
                .await?;
            if params.summary {
                json_result(&PackageDocsSummary::from(document.as_ref()))
            } else {
                json_result(document.as_ref())
            }
        })
        .await
    }

    /// Fetches one file from a package, e.g. "examples/plot.typ".
    #[tool]
    async fn get_package_file(
        &self,
        Parameters(params): Parameters<PackageFileParams>,
    ) -> Result<CallToolResult, McpError> {
        self.track("get_package_file", async move {
            let content = self
                .with_timeout("File fetch", async {
                    Ok(self
                        .context
                        .documents
                        .registry()
                        .fetch_file(&params.package_name, &params.version, &params.file_path)
                        .await?)
                })
                .await?
                .ok_or_else(|| {
                    ServerError::NotFound(format!(
                        "File '{}' not found in package '{}@{}'. Use get_package_docs(summary=true) to see available files.",
                        params.file_path, params.package_name, params.version
                    ))
                })?;
            json_result(&json!({
                "package": params.package_name,
                "version": params.version,
                "file_path": params.file_path,
                "size": content.len(),
                "content": content,
            }))
        })
        .await
    }

    /// Lists every chapter of the Typst documentation with its route and
    /// size. The first call may wait for the documentation to build.
    #[tool]
    async fn list_docs_chapters(&self) -> Result<CallToolResult, McpError> {
        self.track("list_docs_chapters", async move {
            let docs = self.docs().await?;
            json_result(&docs_chapters::list_chapters(&docs))
        })
        .await
    }

    /// Returns one documentation chapter. Use ____ instead of / in the route.
    /// Large chapters with children return their child routes only.
    #[tool]
    async fn get_docs_chapter(
        &self,
        Parameters(params): Parameters<ChapterParams>,
    ) -> Result<CallToolResult, McpError> {
        self.track("get_docs_chapter", async move {
            let docs = self.docs().await?;
            json_result(&docs_chapters::get_chapter(&docs, &params.route)?)
        })
        .await
    }

    /// Returns several documentation chapters; unknown routes yield an
    /// {"error", "route"} entry.
    #[tool]
    async fn get_docs_chapters(
        &self,
        Parameters(params): Parameters<ChaptersParams>,
    ) -> Result<CallToolResult, McpError> {
        self.track("get_docs_chapters", async move {
            let docs = self.docs().await?;
            let chapters: Vec<Value> = params
                .routes
                .iter()
                .map(|route| {
                    docs_chapters::get_chapter(&docs, route).unwrap_or_else(
                        |err| json!({"error": err.to_string(), "route": route}),
                    )
                })
                .collect();
            json_result(&chapters)
        })
        .await
    }

    /// Reports server status, version, documentation state, sandbox state
    /// and uptime.
    #[tool]
    async fn server_health(&self) -> Result<CallToolResult, McpError> {
        self.track("server_health", async move { json_result(&self.health()) })
            .await
    }

    /// Reports aggregate usage counters. No request content is recorded.
    #[tool]
    async fn server_stats(&self) -> Result<CallToolResult, McpError> {
        self.track("server_stats", async move {
            let report = self.context.telemetry.report();
            let cached_packages = match self.context.documents.list_cached().await {
                Ok(entries) => entries.len(),
                Err(err) => {
                    tracing::warn!("could not list cached packages: {err}");
                    0
                }
            };
            json_result(&json!({
                "uptime": report.uptime,
                "tool_calls": {
                    "total": report.tool_calls.total,
                    "by_tool": report.tool_calls.by_name,
                    "top_5": report.top_5,
                },
                "errors": {
                    "total": report.errors.total,
                    "by_tool": report.errors.by_name,
                },
                "resource_accesses": {
                    "total": report.resource_accesses.total,
                    "by_resource": report.resource_accesses.by_name,
                },
                "performance": {
                    "requests_per_hour": report.requests_per_hour,
                    "error_rate": report.error_rate,
                },
                "cache": { "cached_packages": cached_packages },
            }))
        })
        .await
    }
}

#[tool_handler]
impl ServerHandler for TypstServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2025_06_18,
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .enable_resources()
                .build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(instructions(&self.context)),
        }
    }

    async fn list_resources(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListResourcesResult, McpError> {
        let resources = resources::FIXED_RESOURCES
            .iter()
            .map(|descriptor| {
                Resource::new(
                    RawResource {
                        uri: descriptor.uri.to_string(),
                        name: descriptor.name.to_string(),
                        title: None,
                        description: Some(descriptor.description.to_string()),
                        mime_type: Some(JSON_MIME.to_string()),
                        size: None,
                        icons: None,
                    },
                    None,
                )
            })
            .collect();
        Ok(ListResourcesResult {
            resources,
            next_cursor: None,
        })
    }

    async fn list_resource_templates(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListResourceTemplatesResult, McpError> {
        let resource_templates = resources::RESOURCE_TEMPLATES
            .iter()
            .map(|descriptor| {
                ResourceTemplate::new(
                    RawResourceTemplate {
                        uri_template: descriptor.uri.to_string(),
                        name: descriptor.name.to_string(),
                        title: None,
                        description: Some(descriptor.description.to_string()),
                        mime_type: Some(JSON_MIME.to_string()),
                    },
                    None,
                )
            })
            .collect();
        Ok(ListResourceTemplatesResult {
            resource_templates,
            next_cursor: None,
        })
    }

    async fn read_resource(
        &self,
        ReadResourceRequestParam { uri }: ReadResourceRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<ReadResourceResult, McpError> {
        let Some(route) = ResourceRoute::parse(&uri) else {
            return Err(McpError::resource_not_found(
                "resource_not_found",
                Some(json!({ "uri": uri })),
            ));
        };
        let name = route.name();
        self.context.telemetry.record_resource_access(name);
        let body = self.resource_body(&route).await.map_err(|err| {
            self.context.telemetry.record_error(name);
            tracing::warn!("reading {uri} failed: {err}");
            McpError::from(err)
        })?;
        let text = serde_json::to_string_pretty(&body)
            .map_err(|err| McpError::internal_error(err.to_string(), None))?;
        Ok(ReadResourceResult {
            contents: vec![ResourceContents::TextResourceContents {
                uri,
                mime_type: Some(JSON_MIME.to_string()),
                text,
                meta: None,
            }],
        })
    }
}
