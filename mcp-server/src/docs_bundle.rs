//! The core Typst documentation bundle, loaded from the cache or built once
//! from the vendored compiler sources.

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::watch;
use typst_mcp_sandbox::exec::run_command;

use crate::error::Result;
use crate::error::ServerError;

const DOCS_SUBDIR: &str = "typst-docs";
const BUNDLE_FILE: &str = "main.json";

#[derive(Debug, Clone)]
pub enum DocsState {
    NotStarted,
    Building,
    Ready(Arc<Vec<Value>>),
    Failed(String),
}

impl DocsState {
    pub fn label(&self) -> &'static str {
        match self {
            DocsState::NotStarted => "not_started",
            DocsState::Building => "building",
            DocsState::Ready(_) => "ready",
            DocsState::Failed(_) => "failed",
        }
    }

    fn is_settled(&self) -> bool {
        matches!(self, DocsState::Ready(_) | DocsState::Failed(_))
    }
}

#[derive(Debug, Clone)]
pub struct BundleOptions {
    /// `{cache}/typst-docs`; the bundle is `main.json` inside it.
    pub docs_dir: PathBuf,
    pub typst_source_dir: PathBuf,
    pub build_timeout: Duration,
}

impl BundleOptions {
    pub fn new(cache_root: &Path, typst_source_dir: PathBuf, build_timeout: Duration) -> Self {
        Self {
            docs_dir: cache_root.join(DOCS_SUBDIR),
            typst_source_dir,
            build_timeout,
        }
    }

    pub fn bundle_path(&self) -> PathBuf {
        self.docs_dir.join(BUNDLE_FILE)
    }
}

/// At-most-once loader. Readers wait for readiness with a bound and get a
/// retryable error while the build is still running.
#[derive(Debug)]
pub struct DocsBundle {
    state: watch::Sender<DocsState>,
    options: BundleOptions,
}

impl DocsBundle {
    pub fn new(options: BundleOptions) -> Arc<Self> {
        let (state, _) = watch::channel(DocsState::NotStarted);
        Arc::new(Self { state, options })
    }

    pub fn state(&self) -> DocsState {
        self.state.borrow().clone()
    }

    pub fn options(&self) -> &BundleOptions {
        &self.options
    }

    /// Starts the loader unless it already ran. Returns whether this call
    /// started it.
    pub fn start(self: &Arc<Self>) -> bool {
        let started = self.state.send_if_modified(|state| {
            if matches!(state, DocsState::NotStarted) {
                *state = DocsState::Building;
                true
            } else {
                false
            }
        });
        if started {
            let bundle = Arc::clone(self);
            tokio::spawn(async move {
                let next = match load_or_build(&bundle.options).await {
                    Ok(docs) => {
                        tracing::info!("documentation bundle ready ({} chapters)", docs.len());
                        DocsState::Ready(Arc::new(docs))
                    }
                    Err(err) => {
                        tracing::error!("documentation bundle unavailable: {err}");
                        DocsState::Failed(err)
                    }
                };
                bundle.state.send_replace(next);
            });
        }
        started
    }

    /// The loaded chapters, waiting up to `wait` for a running build.
    pub async fn get(self: &Arc<Self>, wait: Duration) -> Result<Arc<Vec<Value>>> {
        self.start();
        let mut rx = self.state.subscribe();
        let settled = match tokio::time::timeout(wait, rx.wait_for(DocsState::is_settled)).await {
            Ok(Ok(state)) => state.clone(),
            Ok(Err(_)) => {
                return Err(ServerError::DocsUnavailable(
                    "documentation loader stopped".to_string(),
                ));
            }
            Err(_) => return Err(ServerError::DocsStillBuilding),
        };
        match settled {
            DocsState::Ready(docs) => Ok(docs),
            DocsState::Failed(reason) => Err(ServerError::DocsUnavailable(reason)),
            DocsState::NotStarted | DocsState::Building => Err(ServerError::DocsStillBuilding),
        }
    }
}

async fn load_or_build(options: &BundleOptions) -> std::result::Result<Vec<Value>, String> {
    let bundle_path = options.bundle_path();
    if !tokio::fs::try_exists(&bundle_path).await.unwrap_or(false) {
        build(options).await?;
    }
    let contents = tokio::fs::read_to_string(&bundle_path)
        .await
        .map_err(|err| format!("failed to read {}: {err}", bundle_path.display()))?;
    parse_bundle(&contents)
}

fn parse_bundle(contents: &str) -> std::result::Result<Vec<Value>, String> {
    match serde_json::from_str::<Value>(contents) {
        Ok(Value::Array(chapters)) => Ok(chapters),
        Ok(_) => Err("documentation bundle is not a list of chapters".to_string()),
        Err(err) => Err(format!("documentation bundle is not valid JSON: {err}")),
    }
}

/// The docs generator is trusted vendored code, so it runs outside the
/// sandbox helper.
async fn build(options: &BundleOptions) -> std::result::Result<(), String> {
    let manifest = options.typst_source_dir.join("Cargo.toml");
    if !tokio::fs::try_exists(&manifest).await.unwrap_or(false) {
        return Err(format!(
            "Typst sources not found at {}; cannot build documentation",
            options.typst_source_dir.display()
        ));
    }
    tokio::fs::create_dir_all(&options.docs_dir)
        .await
        .map_err(|err| format!("failed to create {}: {err}", options.docs_dir.display()))?;

    tracing::info!(
        "building documentation bundle from {} (this can take a few minutes)",
        options.typst_source_dir.display()
    );
    let argv = build_command(options);
    let output = run_command(&argv, None, options.build_timeout)
        .await
        .map_err(|err| format!("failed to run the documentation build: {err}"))?;
    if output.timed_out {
        return Err(format!(
            "documentation build timed out after {}s",
            options.build_timeout.as_secs()
        ));
    }
    if !output.success() {
        return Err(format!(
            "documentation build failed (exit {}): {}",
            output.exit_code,
            output.stderr.trim()
        ));
    }
    Ok(())
}

fn build_command(options: &BundleOptions) -> Vec<String> {
    vec![
        "cargo".to_string(),
        "run".to_string(),
        "--manifest-path".to_string(),
        options
            .typst_source_dir
            .join("Cargo.toml")
            .to_string_lossy()
            .into_owned(),
        "--package".to_string(),
        "typst-docs".to_string(),
        "--".to_string(),
        "--assets-dir".to_string(),
        options.docs_dir.to_string_lossy().into_owned(),
        "--out-file".to_string(),
        options.bundle_path().to_string_lossy().into_owned(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn options(dir: &TempDir) -> BundleOptions {
        BundleOptions::new(
            dir.path(),
            dir.path().join("vendor").join("typst"),
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn cached_bundle_is_loaded_once() {
        let dir = TempDir::new().expect("tempdir");
        let options = options(&dir);
        std::fs::create_dir_all(&options.docs_dir).expect("docs dir");
        std::fs::write(
            options.bundle_path(),
            r#"[{"route": "/reference/", "title": "Reference"}]"#,
        )
        .expect("bundle");

        let bundle = DocsBundle::new(options);
        assert!(bundle.start());
        assert!(!bundle.start());
        let docs = bundle.get(Duration::from_secs(5)).await.expect("ready");
        assert_eq!(docs.len(), 1);
        assert_eq!(bundle.state().label(), "ready");
    }

    #[tokio::test]
    async fn missing_sources_fail_without_retrying() {
        let dir = TempDir::new().expect("tempdir");
        let bundle = DocsBundle::new(options(&dir));
        let err = bundle.get(Duration::from_secs(5)).await.expect_err("no sources");
        assert!(matches!(err, ServerError::DocsUnavailable(ref reason) if reason.contains("not found")));
        assert_eq!(bundle.state().label(), "failed");
        assert!(!bundle.start());
    }

    #[tokio::test(start_paused = true)]
    async fn waiting_on_a_running_build_is_retryable() {
        let dir = TempDir::new().expect("tempdir");
        let bundle = DocsBundle::new(options(&dir));
        bundle.state.send_replace(DocsState::Building);

        let err = bundle.get(Duration::from_secs(10)).await.expect_err("still building");
        assert!(matches!(err, ServerError::DocsStillBuilding));
    }

    #[test]
    fn bundle_must_be_a_chapter_list() {
        assert!(parse_bundle("{}").is_err());
        assert!(parse_bundle("not json").is_err());
        assert_eq!(parse_bundle("[]").map(|docs| docs.len()), Ok(0));
    }

    #[test]
    fn build_command_targets_the_docs_package() {
        let dir = TempDir::new().expect("tempdir");
        let options = options(&dir);
        let argv = build_command(&options);
        assert_eq!(&argv[..2], &["cargo".to_string(), "run".to_string()]);
        assert!(argv.contains(&"typst-docs".to_string()));
        assert_eq!(
            argv.last().map(PathBuf::from),
            Some(options.bundle_path())
        );
    }
}
