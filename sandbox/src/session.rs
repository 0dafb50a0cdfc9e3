//! Runtime handle over a materialized policy.
//!
//! ```text
//! Uninitialized ──(--disable-sandbox)──────────────▶ Disabled
//!       │
//!       ├──(srt on PATH)───────────────────────────▶ ExternallyInstalled
//!       ├──(npx runs the pinned helper)────────────▶ AutoFetched
//!       └──(neither)───────────────────────────────▶ Unavailable
//! ```
//!
//! Every state is terminal for the life of the process. `Unavailable` is a
//! startup error on platforms where the helper is mandatory.

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;

use crate::artifact::PolicyArtifact;
use crate::artifact::ProtectionState;
use crate::error::Result;
use crate::error::SandboxError;
use crate::exec::ExecOutput;
use crate::exec::run_command;
use crate::platform::PlatformCapabilities;
use crate::policy::SandboxPolicy;

pub const HELPER_BINARY: &str = "srt";
pub const PACKAGE_RUNNER: &str = "npx";
pub const HELPER_PACKAGE: &str = "@anthropic-ai/sandbox-runtime";
/// Version fetched by the package runner. Pinned so a newly published release
/// cannot be substituted underneath us.
pub const HELPER_PINNED_VERSION: &str = "0.0.13";

/// The first download can be slow.
const PROBE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Uninitialized,
    Disabled,
    ExternallyInstalled,
    AutoFetched,
    Unavailable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SandboxMethod {
    None,
    ExternallyInstalled,
    AutoFetched,
}

/// How to invoke the enforcement helper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Helper {
    pub method: SandboxMethod,
    /// argv prefix placed before `--settings <artifact> --`.
    pub invocation: Vec<String>,
}

impl Helper {
    pub fn installed(binary: impl Into<String>) -> Self {
        Self {
            method: SandboxMethod::ExternallyInstalled,
            invocation: vec![binary.into()],
        }
    }

    pub fn package_runner(runner: impl Into<String>) -> Self {
        Self {
            method: SandboxMethod::AutoFetched,
            invocation: vec![
                runner.into(),
                "-y".to_string(),
                format!("{HELPER_PACKAGE}@{HELPER_PINNED_VERSION}"),
            ],
        }
    }
}

/// Ways of locating the helper, evaluated first-match-wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HelperLocator {
    OnPath,
    PackageRunner,
}

pub const DEFAULT_LOCATORS: &[HelperLocator] = &[HelperLocator::OnPath, HelperLocator::PackageRunner];

impl HelperLocator {
    pub async fn locate(self) -> Option<Helper> {
        match self {
            HelperLocator::OnPath => {
                let path = which::which(HELPER_BINARY).ok()?;
                Some(Helper::installed(path.to_string_lossy().into_owned()))
            }
            HelperLocator::PackageRunner => {
                let runner = which::which(PACKAGE_RUNNER).ok()?;
                let helper = Helper::package_runner(runner.to_string_lossy().into_owned());
                let mut probe = helper.invocation.clone();
                probe.push("--version".to_string());
                match run_command(&probe, None, PROBE_TIMEOUT).await {
                    Ok(output) if output.success() => {
                        tracing::info!(
                            "{HELPER_PACKAGE}@{HELPER_PINNED_VERSION} available via {PACKAGE_RUNNER}: {}",
                            output.stdout.trim()
                        );
                        Some(helper)
                    }
                    Ok(output) => {
                        tracing::warn!(
                            "{PACKAGE_RUNNER} probe for {HELPER_PACKAGE} failed (exit {}, timed out: {}): {}",
                            output.exit_code,
                            output.timed_out,
                            output.stderr.trim()
                        );
                        None
                    }
                    Err(err) => {
                        tracing::warn!("{PACKAGE_RUNNER} probe for {HELPER_PACKAGE} failed: {err}");
                        None
                    }
                }
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Set only from `--disable-sandbox`.
    pub disabled: bool,
    /// Where the settings artifact is created; the session scratch directory.
    pub artifact_dir: PathBuf,
    pub locators: Vec<HelperLocator>,
}

impl SessionOptions {
    pub fn new(artifact_dir: &Path, disabled: bool) -> Self {
        Self {
            disabled,
            artifact_dir: artifact_dir.to_path_buf(),
            locators: DEFAULT_LOCATORS.to_vec(),
        }
    }
}

#[derive(Debug)]
pub struct SandboxSession {
    state: SessionState,
    policy: SandboxPolicy,
    helper: Option<Helper>,
    artifact_path: Option<PathBuf>,
    protection: ProtectionState,
    artifact: Mutex<Option<PolicyArtifact>>,
}

impl SandboxSession {
    /// Detects the helper and, when found, materializes the policy artifact.
    ///
    /// Fails only when no helper is reachable on a platform where the sandbox
    /// is mandatory.
    pub async fn initialize(
        policy: SandboxPolicy,
        options: SessionOptions,
        platform: Arc<dyn PlatformCapabilities>,
    ) -> Result<Self> {
        if options.disabled {
            tracing::warn!(
                "\n============================================================\n\
                 SANDBOX DISABLED (--disable-sandbox)\n\
                 External commands run WITHOUT filesystem or network\n\
                 restrictions. Only timeouts protect this host.\n\
                 ============================================================"
            );
            return Ok(Self::disabled(policy));
        }

        let mut helper = None;
        for locator in &options.locators {
            if let Some(found) = locator.locate().await {
                helper = Some(found);
                break;
            }
        }

        match helper {
            Some(helper) => {
                Self::with_helper(policy, helper, &options.artifact_dir, platform).await
            }
            None if platform.sandbox_mandatory() => {
                Err(SandboxError::UnavailableOnMandatoryPlatform {
                    platform: platform.name(),
                    reason: format!("neither `{HELPER_BINARY}` nor `{PACKAGE_RUNNER}` is usable"),
                })
            }
            None => {
                tracing::warn!(
                    "\n============================================================\n\
                     SANDBOX UNAVAILABLE on {}\n\
                     Install Node.js or `{HELPER_BINARY}` to enable it. Continuing\n\
                     with timeouts and permission hardening only.\n\
                     ============================================================",
                    platform.name()
                );
                Ok(Self::unenforced(SessionState::Unavailable, policy))
            }
        }
    }

    /// Builds an enforced session around a known helper.
    pub async fn with_helper(
        policy: SandboxPolicy,
        helper: Helper,
        artifact_dir: &Path,
        platform: Arc<dyn PlatformCapabilities>,
    ) -> Result<Self> {
        let state = match helper.method {
            SandboxMethod::AutoFetched => SessionState::AutoFetched,
            _ => SessionState::ExternallyInstalled,
        };
        let artifact_policy = policy.clone();
        let dir = artifact_dir.to_path_buf();
        let artifact = tokio::task::spawn_blocking(move || {
            PolicyArtifact::materialize(&artifact_policy, &dir, platform)
        })
        .await
        .map_err(std::io::Error::other)??;

        tracing::info!("sandboxing enabled ({state:?})");
        Ok(Self {
            state,
            policy,
            helper: Some(helper),
            artifact_path: Some(artifact.path().to_path_buf()),
            protection: artifact.protection_state(),
            artifact: Mutex::new(Some(artifact)),
        })
    }

    pub fn disabled(policy: SandboxPolicy) -> Self {
        Self::unenforced(SessionState::Disabled, policy)
    }

    fn unenforced(state: SessionState, policy: SandboxPolicy) -> Self {
        Self {
            state,
            policy,
            helper: None,
            artifact_path: None,
            protection: ProtectionState::Mutable,
            artifact: Mutex::new(None),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn method(&self) -> SandboxMethod {
        self.helper
            .as_ref()
            .map_or(SandboxMethod::None, |helper| helper.method)
    }

    pub fn is_enforced(&self) -> bool {
        self.helper.is_some() && self.artifact_path.is_some()
    }

    pub fn policy(&self) -> &SandboxPolicy {
        &self.policy
    }

    pub fn artifact_path(&self) -> Option<&Path> {
        self.artifact_path.as_deref()
    }

    pub fn protection_state(&self) -> ProtectionState {
        self.protection
    }

    /// Prefixes `command` with the helper invocation. Unchanged when the
    /// session is not enforcing.
    pub fn wrap(&self, command: Vec<String>) -> Vec<String> {
        let (Some(helper), Some(artifact)) = (&self.helper, &self.artifact_path) else {
            return command;
        };
        let mut wrapped = helper.invocation.clone();
        wrapped.push("--settings".to_string());
        wrapped.push(artifact.to_string_lossy().into_owned());
        wrapped.push("--".to_string());
        wrapped.extend(command);
        wrapped
    }

    /// Wraps and runs `command`.
    pub async fn run(
        &self,
        command: Vec<String>,
        cwd: Option<&Path>,
        timeout: Duration,
    ) -> Result<ExecOutput> {
        let wrapped = self.wrap(command);
        tracing::debug!("running {wrapped:?}");
        run_command(&wrapped, cwd, timeout).await
    }

    /// Unlocks and deletes the artifact. Must run before the scratch directory
    /// is removed.
    pub fn cleanup(&self) {
        let artifact = match self.artifact.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(mut artifact) = artifact
            && let Err(err) = artifact.cleanup()
        {
            tracing::warn!(
                "failed to remove sandbox settings {}: {err}",
                artifact.path().display()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::build_policy;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn compile_command() -> Vec<String> {
        ["typst", "compile", "in.typ", "out.pdf"]
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    #[test]
    fn disabled_session_leaves_command_unchanged() {
        let session = SandboxSession::disabled(build_policy(
            Path::new("/tmp/s"),
            Path::new("/w"),
            None,
        ));
        assert_eq!(session.state(), SessionState::Disabled);
        assert_eq!(session.method(), SandboxMethod::None);
        assert_eq!(session.wrap(compile_command()), compile_command());
    }

    #[tokio::test]
    async fn installed_session_prefixes_helper_and_artifact() {
        let dir = TempDir::new().expect("tempdir");
        let policy = build_policy(dir.path(), dir.path(), None);
        let session = SandboxSession::with_helper(
            policy,
            Helper::installed("srt"),
            dir.path(),
            crate::platform::current(),
        )
        .await
        .expect("session");

        assert_eq!(session.state(), SessionState::ExternallyInstalled);
        let artifact = session
            .artifact_path()
            .expect("artifact path")
            .to_string_lossy()
            .into_owned();
        let mut expected = vec![
            "srt".to_string(),
            "--settings".to_string(),
            artifact,
            "--".to_string(),
        ];
        expected.extend(compile_command());
        assert_eq!(session.wrap(compile_command()), expected);

        session.cleanup();
    }

    #[tokio::test]
    async fn package_runner_pins_helper_version() {
        let dir = TempDir::new().expect("tempdir");
        let session = SandboxSession::with_helper(
            build_policy(dir.path(), dir.path(), None),
            Helper::package_runner("npx"),
            dir.path(),
            crate::platform::current(),
        )
        .await
        .expect("session");

        assert_eq!(session.state(), SessionState::AutoFetched);
        let wrapped = session.wrap(vec!["true".to_string()]);
        assert_eq!(
            &wrapped[..4],
            &[
                "npx".to_string(),
                "-y".to_string(),
                format!("{HELPER_PACKAGE}@{HELPER_PINNED_VERSION}"),
                "--settings".to_string(),
            ]
        );
        session.cleanup();
    }

    #[tokio::test]
    async fn cleanup_removes_artifact_before_scratch_dir() {
        let dir = TempDir::new().expect("tempdir");
        let session = SandboxSession::with_helper(
            build_policy(dir.path(), dir.path(), None),
            Helper::installed("srt"),
            dir.path(),
            crate::platform::current(),
        )
        .await
        .expect("session");
        let artifact = session.artifact_path().expect("artifact").to_path_buf();
        assert!(artifact.exists());

        session.cleanup();
        assert!(!artifact.exists());
        session.cleanup();
        dir.close().expect("scratch dir removable");
    }

    #[tokio::test]
    async fn disable_flag_skips_detection() {
        let dir = TempDir::new().expect("tempdir");
        let session = SandboxSession::initialize(
            build_policy(dir.path(), dir.path(), None),
            SessionOptions {
                disabled: true,
                artifact_dir: dir.path().to_path_buf(),
                locators: Vec::new(),
            },
            crate::platform::current(),
        )
        .await
        .expect("session");
        assert_eq!(session.state(), SessionState::Disabled);
        assert!(!session.is_enforced());
    }

    #[tokio::test]
    async fn missing_helper_follows_platform_policy() {
        let dir = TempDir::new().expect("tempdir");
        let platform = crate::platform::current();
        let result = SandboxSession::initialize(
            build_policy(dir.path(), dir.path(), None),
            SessionOptions {
                disabled: false,
                artifact_dir: dir.path().to_path_buf(),
                locators: Vec::new(),
            },
            platform.clone(),
        )
        .await;

        if platform.sandbox_mandatory() {
            assert!(matches!(
                result,
                Err(SandboxError::UnavailableOnMandatoryPlatform { .. })
            ));
        } else {
            let session = result.expect("session");
            assert_eq!(session.state(), SessionState::Unavailable);
            assert_eq!(session.wrap(compile_command()), compile_command());
        }
    }
}
