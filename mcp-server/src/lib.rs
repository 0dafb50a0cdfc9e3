//! MCP server exposing Typst conversion, rendering and documentation tools.
//!
//! Every external command (`pandoc`, `typst`) runs through the session
//! sandbox from `typst-mcp-sandbox`; package documentation is fetched through
//! `typst-mcp-package-docs`.

use std::sync::Arc;

use anyhow::Context as _;
use clap::Parser;
use rmcp::ServiceExt;
use rmcp::transport::stdio;
use tracing_subscriber::EnvFilter;
use typst_mcp_registry::RegistryClient;
use typst_mcp_sandbox::EnvOverrides;
use typst_mcp_sandbox::SandboxPolicy;
use typst_mcp_sandbox::SandboxSession;
use typst_mcp_sandbox::SessionOptions;

pub mod cli;
pub mod config;
pub mod context;
pub mod convert;
pub mod docs_bundle;
pub mod docs_chapters;
pub mod error;
pub mod pdf_output;
pub mod render;
pub mod resources;
pub mod server;
pub mod telemetry;

use crate::cli::Cli;
use crate::config::ServerConfig;
use crate::context::AppContext;
use crate::server::TypstServer;

const SCRATCH_PREFIX: &str = "typst-mcp-";
const REQUIRED_TOOLS: &[&str] = &["typst", "pandoc"];

#[tokio::main]
pub async fn run_main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => ServerConfig::load(path)
            .await
            .with_context(|| format!("invalid configuration file {}", path.display()))?,
        None => ServerConfig::default(),
    };
    let env_overrides = EnvOverrides::from_env();

    let scratch_parent = cli.scratch_dir.clone().unwrap_or_else(std::env::temp_dir);
    tokio::fs::create_dir_all(&scratch_parent).await?;
    let scratch = tempfile::Builder::new()
        .prefix(SCRATCH_PREFIX)
        .tempdir_in(&scratch_parent)
        .context("failed to create the session scratch directory")?;

    let platform = typst_mcp_sandbox::platform::current();
    let cwd = std::env::current_dir()?;
    let mut policy = SandboxPolicy::builder(scratch.path(), &cwd)
        .deny_read(cli.deny_read_paths())
        .env_overrides(&env_overrides)
        .tool_cache_dirs(platform.tool_cache_dirs());
    if let Some(paths) = cli.read_allow_only_paths() {
        policy = policy.read_allow_only(paths);
    }
    let session = SandboxSession::initialize(
        policy.build(),
        SessionOptions::new(scratch.path(), cli.disable_sandbox),
        platform,
    )
    .await
    .inspect_err(|err| tracing::error!("sandbox initialization failed: {err}"))?;

    for tool in REQUIRED_TOOLS {
        if which::which(tool).is_err() {
            tracing::warn!("`{tool}` not found on PATH; tools that need it will fail");
        }
    }

    let cache_root = config::resolve_cache_dir(|key| std::env::var(key).ok());
    let registry = RegistryClient::http(config.package_fetch_timeout())?;
    let background_docs = config.enable_background_docs_build;
    let context = Arc::new(AppContext::new(
        config,
        cli.strict,
        Arc::new(session),
        scratch,
        &cache_root,
        registry,
        pdf_output::default_pdf_dir(),
    ));
    if background_docs {
        context.docs.start();
    }

    tracing::info!(
        "Starting Typst MCP server (cache: {}, scratch: {})",
        cache_root.display(),
        context.scratch_dir().display()
    );
    let service = TypstServer::new(Arc::clone(&context))
        .serve(stdio())
        .await
        .inspect_err(|err| tracing::error!("serving error: {err:?}"))?;

    run_until_exit(&context, service.waiting(), shutdown_signal()).await?;
    Ok(())
}

/// Waits for the client to leave or a shutdown signal. Session resources are
/// released before the outcome is reported, including when the service
/// ended with an error.
async fn run_until_exit<T, E>(
    context: &AppContext,
    service_end: impl Future<Output = Result<T, E>>,
    signal: impl Future<Output = ()>,
) -> Result<(), E>
where
    T: std::fmt::Debug,
    E: std::fmt::Display,
{
    let outcome = tokio::select! {
        quit = service_end => quit
            .map(|reason| tracing::info!("client disconnected: {reason:?}"))
            .inspect_err(|err| tracing::error!("service ended with an error: {err}")),
        () = signal => {
            tracing::info!("shutdown signal received");
            Ok(())
        }
    };
    context.shutdown().await;
    outcome
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::SignalKind;
    use tokio::signal::unix::signal;

    match signal(SignalKind::terminate()) {
        Ok(mut terminate) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = terminate.recv() => {}
            }
        }
        Err(err) => {
            tracing::warn!("could not listen for SIGTERM: {err}");
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
