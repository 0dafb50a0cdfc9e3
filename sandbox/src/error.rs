use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SandboxError>;

#[derive(Debug, Error)]
pub enum SandboxError {
    /// No enforcement helper could be reached on a platform where running
    /// unprotected is not allowed.
    #[error(
        "sandbox runtime unavailable on {platform}: {reason}; install `srt` or `npx`, or pass --disable-sandbox"
    )]
    UnavailableOnMandatoryPlatform {
        platform: &'static str,
        reason: String,
    },

    #[error("failed to materialize sandbox settings at {path}: {source}")]
    Artifact {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("sandbox settings at {path} are still writable after hardening (mode {mode:o})")]
    ArtifactNotLocked { path: PathBuf, mode: u32 },

    #[error("failed to serialize sandbox settings: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("command timed out after {0:?}")]
    Timeout(Duration),

    #[error("refusing to run an empty command")]
    EmptyCommand,

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Failures of [`crate::fs_ops::sandboxed_copy`].
#[derive(Debug, Error)]
pub enum FileOpError {
    #[error("sandbox denied writing {destination}: {stderr}")]
    CopyDenied { destination: PathBuf, stderr: String },

    #[error("source file does not exist: {0}")]
    SourceMissing(PathBuf),

    #[error("copy reported success but {0} was not created")]
    DestinationNotCreated(PathBuf),

    #[error("copy reported success but {0} does not hold the copied contents")]
    DestinationNotUpdated(PathBuf),

    #[error("copy to {destination} failed with exit code {exit_code}: {stderr}")]
    CopyFailed {
        destination: PathBuf,
        exit_code: i32,
        stderr: String,
    },

    #[error(transparent)]
    Sandbox(#[from] SandboxError),

    #[error(transparent)]
    Io(#[from] io::Error),
}
