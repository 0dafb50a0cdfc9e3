//! The settings file handed to the enforcement helper.
//!
//! The file is created exclusively in the session scratch directory, written
//! while owner-only, flipped to owner read-only and then hardened further on
//! the still-open handle where the platform allows it. Its own path is listed
//! under `denyWrite`.

use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;

use crate::error::Result;
use crate::error::SandboxError;
use crate::platform::Hardening;
use crate::platform::PlatformCapabilities;
use crate::policy::SandboxPolicy;
use crate::settings::SrtSettings;

const ARTIFACT_PREFIX: &str = "srt-settings-";
const ARTIFACT_SUFFIX: &str = ".json";

/// Protection reached by the artifact. Only ever strengthens while the session
/// is alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtectionState {
    Mutable,
    PermissionLocked,
    ImmutableFlagSet,
    LockHeld,
}

#[derive(Debug)]
pub struct PolicyArtifact {
    path: PathBuf,
    state: ProtectionState,
    hardening: Option<Hardening>,
    platform: Arc<dyn PlatformCapabilities>,
}

impl PolicyArtifact {
    /// Serializes `policy` into a fresh file inside `dir` and hardens it.
    pub fn materialize(
        policy: &SandboxPolicy,
        dir: &Path,
        platform: Arc<dyn PlatformCapabilities>,
    ) -> Result<Self> {
        warn_if_shared_dir(dir);

        // O_EXCL creation; a pre-planted path cannot be reused.
        let named = tempfile::Builder::new()
            .prefix(ARTIFACT_PREFIX)
            .suffix(ARTIFACT_SUFFIX)
            .tempfile_in(dir)
            .map_err(|source| SandboxError::Artifact {
                path: dir.to_path_buf(),
                source,
            })?;
        let path = named.path().to_path_buf();
        let artifact_err = |source| SandboxError::Artifact {
            path: path.clone(),
            source,
        };

        let mut state = ProtectionState::Mutable;
        platform
            .restrict_to_owner(named.as_file())
            .map_err(artifact_err)?;

        let settings = SrtSettings::from_policy(&policy.enforced(), &path);
        let json = settings.to_pretty_json()?;
        let mut file = named.as_file();
        file.write_all(json.as_bytes()).map_err(artifact_err)?;
        file.sync_all().map_err(artifact_err)?;
        if file.metadata().map_err(artifact_err)?.len() == 0 {
            return Err(artifact_err(std::io::Error::other(
                "settings file is empty after write",
            )));
        }

        platform.make_read_only(file).map_err(artifact_err)?;
        state = state.max(ProtectionState::PermissionLocked);

        let (file, path) = named.keep().map_err(|err| artifact_err(err.error))?;
        let hardening = platform.harden(&file, &path);
        state = state.max(hardening.state);
        drop(file);

        let artifact = Self {
            path,
            state,
            hardening: Some(hardening),
            platform,
        };
        artifact.verify_read_only()?;
        tracing::info!(
            "sandbox settings written to {} ({:?})",
            artifact.path.display(),
            artifact.state
        );
        Ok(artifact)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn protection_state(&self) -> ProtectionState {
        self.state
    }

    pub fn holds_lock(&self) -> bool {
        self.hardening.as_ref().is_some_and(Hardening::holds_lock)
    }

    /// Removes hardening and deletes the file. Safe to call more than once.
    pub fn cleanup(&mut self) -> std::io::Result<()> {
        let Some(hardening) = self.hardening.take() else {
            return Ok(());
        };
        self.platform.unharden(&self.path, hardening);
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                tracing::info!("removed sandbox settings {}", self.path.display());
                Ok(())
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err),
        }
    }

    #[cfg(unix)]
    fn verify_read_only(&self) -> Result<()> {
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(&self.path)?.permissions().mode() & 0o777;
        if mode != 0o400 {
            return Err(SandboxError::ArtifactNotLocked {
                path: self.path.clone(),
                mode,
            });
        }
        Ok(())
    }

    #[cfg(not(unix))]
    fn verify_read_only(&self) -> Result<()> {
        if !std::fs::metadata(&self.path)?.permissions().readonly() {
            return Err(SandboxError::ArtifactNotLocked {
                path: self.path.clone(),
                mode: 0,
            });
        }
        Ok(())
    }
}

impl Drop for PolicyArtifact {
    fn drop(&mut self) {
        if let Err(err) = self.cleanup() {
            tracing::warn!(
                "failed to remove sandbox settings {}: {err}",
                self.path.display()
            );
        }
    }
}

#[cfg(unix)]
fn warn_if_shared_dir(dir: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Ok(metadata) = std::fs::metadata(dir)
        && metadata.permissions().mode() & 0o022 != 0
    {
        tracing::warn!(
            "{} is writable by group or others; the settings file may be tampered with",
            dir.display()
        );
    }
}

#[cfg(not(unix))]
fn warn_if_shared_dir(_dir: &Path) {}
