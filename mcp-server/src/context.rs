use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;

use tempfile::TempDir;
use typst_mcp_package_docs::DocumentCache;
use typst_mcp_registry::RegistryClient;
use typst_mcp_sandbox::SandboxSession;

use crate::config::ServerConfig;
use crate::convert::Converter;
use crate::convert::ToolTimeouts;
use crate::docs_bundle::BundleOptions;
use crate::docs_bundle::DocsBundle;
use crate::pdf_output::PdfOutput;
use crate::telemetry::Telemetry;

/// State shared by every request for the life of the process.
#[derive(Debug)]
pub struct AppContext {
    pub config: ServerConfig,
    pub session: Arc<SandboxSession>,
    pub converter: Converter,
    pub pdf_output: PdfOutput,
    pub documents: DocumentCache,
    pub docs: Arc<DocsBundle>,
    pub telemetry: Telemetry,
    scratch_path: PathBuf,
    scratch: Mutex<Option<TempDir>>,
}

impl AppContext {
    /// Takes ownership of the scratch directory; it is removed by
    /// [`AppContext::shutdown`] after the sandbox artifact inside it.
    pub fn new(
        config: ServerConfig,
        strict: bool,
        session: Arc<SandboxSession>,
        scratch: TempDir,
        cache_root: &Path,
        registry: RegistryClient,
        pdf_dir: PathBuf,
    ) -> Self {
        let scratch_path = scratch.path().to_path_buf();
        let converter = Converter::new(
            Arc::clone(&session),
            scratch_path.clone(),
            strict,
            ToolTimeouts::from(&config),
        );
        let documents = DocumentCache::new(registry, cache_root)
            .with_optional_budget_ratio(config.optional_fetch_budget_ratio);
        let docs = DocsBundle::new(BundleOptions::new(
            cache_root,
            config.typst_source_dir.clone(),
            config.docs_build_timeout(),
        ));
        Self {
            pdf_output: PdfOutput::new(pdf_dir, config.pdf_cleanup_age()),
            config,
            session,
            converter,
            documents,
            docs,
            telemetry: Telemetry::new(),
            scratch_path,
            scratch: Mutex::new(Some(scratch)),
        }
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_path
    }

    /// Removes the sandbox artifact, then the scratch directory, then every
    /// generated PDF. Safe to call more than once.
    pub async fn shutdown(&self) {
        self.session.cleanup();

        let scratch = match self.scratch.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(scratch) = scratch {
            let path = scratch.path().to_path_buf();
            if let Err(err) = scratch.close() {
                tracing::warn!("failed to remove scratch directory {}: {err}", path.display());
            }
        }

        let removed = self.pdf_output.remove_all().await;
        if removed > 0 {
            tracing::info!("removed {removed} generated PDF(s)");
        }
    }
}
