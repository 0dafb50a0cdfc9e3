//! File operations used to place generated output.

use std::io;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::FileOpError;
use crate::error::SandboxError;
use crate::exec::is_likely_sandbox_denied;
use crate::session::SandboxSession;

/// Replaces `path` with `bytes` atomically.
///
/// The sibling temp file gets `mode` before any byte is written and is removed
/// on every failure path. `mode` is ignored on non-unix targets.
pub fn atomic_write(path: &Path, bytes: &[u8], mode: u32) -> io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut tmp = tempfile::Builder::new()
        .prefix(".tmp-")
        .suffix(".part")
        .tempfile_in(dir)?;
    set_mode(tmp.as_file(), mode)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|err| err.error)?;

    verify_mode(path, mode);
    Ok(())
}

#[cfg(unix)]
fn set_mode(file: &std::fs::File, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(std::fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(_file: &std::fs::File, _mode: u32) -> io::Result<()> {
    Ok(())
}

#[cfg(unix)]
fn verify_mode(path: &Path, mode: u32) {
    use std::os::unix::fs::PermissionsExt;
    let actual = match std::fs::metadata(path) {
        Ok(metadata) => metadata.permissions().mode() & 0o777,
        Err(err) => {
            tracing::warn!("could not stat {}: {err}", path.display());
            return;
        }
    };
    if actual != mode & 0o777 {
        tracing::warn!(
            "{} has mode {actual:o}, expected {mode:o}; correcting",
            path.display()
        );
        if let Err(err) = std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)) {
            tracing::warn!("chmod {} failed: {err}", path.display());
        }
    }
}

#[cfg(not(unix))]
fn verify_mode(_path: &Path, _mode: u32) {}

fn copy_command(source: &Path, destination: &Path) -> Vec<String> {
    let source = source.to_string_lossy().into_owned();
    let destination = destination.to_string_lossy().into_owned();
    if cfg!(windows) {
        vec![
            "cmd".to_string(),
            "/c".to_string(),
            "copy".to_string(),
            "/Y".to_string(),
            source,
            destination,
        ]
    } else {
        vec!["cp".to_string(), source, destination]
    }
}

/// Copies `source` to `destination` by running the OS copy command through the
/// session, so the helper decides whether `destination` is writable.
pub async fn sandboxed_copy(
    session: &SandboxSession,
    source: &Path,
    destination: &Path,
    timeout: Duration,
) -> Result<PathBuf, FileOpError> {
    if !tokio::fs::try_exists(source).await? {
        return Err(FileOpError::SourceMissing(source.to_path_buf()));
    }

    let output = session
        .run(copy_command(source, destination), None, timeout)
        .await?;
    if output.timed_out {
        return Err(SandboxError::Timeout(timeout).into());
    }
    if !output.success() {
        let stderr = output.stderr.trim().to_string();
        tracing::warn!(
            "copy to {} failed (exit {}): {stderr}",
            destination.display(),
            output.exit_code
        );
        if is_likely_sandbox_denied(&output) {
            return Err(FileOpError::CopyDenied {
                destination: destination.to_path_buf(),
                stderr,
            });
        }
        return Err(FileOpError::CopyFailed {
            destination: destination.to_path_buf(),
            exit_code: output.exit_code,
            stderr,
        });
    }

    if !tokio::fs::try_exists(destination).await? {
        return Err(FileOpError::DestinationNotCreated(destination.to_path_buf()));
    }
    if !same_contents(source, destination).await? {
        tracing::warn!(
            "copy to {} reported success but left different contents",
            destination.display()
        );
        return Err(FileOpError::DestinationNotUpdated(destination.to_path_buf()));
    }
    Ok(destination.to_path_buf())
}

/// A pre-existing destination only counts as written when it now holds the
/// source bytes.
async fn same_contents(source: &Path, destination: &Path) -> io::Result<bool> {
    let source_len = tokio::fs::metadata(source).await?.len();
    let destination_len = tokio::fs::metadata(destination).await?.len();
    if source_len != destination_len {
        return Ok(false);
    }
    Ok(tokio::fs::read(source).await? == tokio::fs::read(destination).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::build_policy;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn atomic_write_replaces_contents() {
        let dir = TempDir::new().expect("tempdir");
        let target = dir.path().join("doc.json");
        std::fs::write(&target, b"old").expect("seed");

        atomic_write(&target, b"new contents", 0o644).expect("write");

        assert_eq!(std::fs::read(&target).expect("read"), b"new contents");
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .expect("read_dir")
            .filter_map(std::result::Result::ok)
            .filter(|entry| entry.file_name().to_string_lossy().starts_with(".tmp-"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn atomic_write_applies_mode() {
        use std::os::unix::fs::PermissionsExt;
        let dir = TempDir::new().expect("tempdir");
        let target = dir.path().join("secret.pdf");

        atomic_write(&target, b"%PDF", 0o600).expect("write");

        let mode = std::fs::metadata(&target)
            .expect("metadata")
            .permissions()
            .mode()
            & 0o777;
        assert_eq!(mode, 0o600);
    }

    #[test]
    fn atomic_write_into_missing_directory_fails_cleanly() {
        let dir = TempDir::new().expect("tempdir");
        let target = dir.path().join("missing").join("x.json");
        assert!(atomic_write(&target, b"{}", 0o644).is_err());
        assert!(!target.exists());
    }

    #[tokio::test]
    async fn sandboxed_copy_reports_missing_source() {
        let dir = TempDir::new().expect("tempdir");
        let session = SandboxSession::disabled(build_policy(dir.path(), dir.path(), None));
        let err = sandboxed_copy(
            &session,
            &dir.path().join("nope.pdf"),
            &dir.path().join("out.pdf"),
            Duration::from_secs(5),
        )
        .await
        .expect_err("missing source");
        assert!(matches!(err, FileOpError::SourceMissing(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn sandboxed_copy_copies_through_session() {
        let dir = TempDir::new().expect("tempdir");
        let session = SandboxSession::disabled(build_policy(dir.path(), dir.path(), None));
        let source = dir.path().join("in.pdf");
        std::fs::write(&source, b"%PDF-1.7").expect("seed");
        let destination = dir.path().join("out.pdf");

        let copied = sandboxed_copy(&session, &source, &destination, Duration::from_secs(10))
            .await
            .expect("copy");

        assert_eq!(copied, destination);
        assert_eq!(std::fs::read(&destination).expect("read"), b"%PDF-1.7");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn sandboxed_copy_surfaces_copy_failure() {
        let dir = TempDir::new().expect("tempdir");
        let session = SandboxSession::disabled(build_policy(dir.path(), dir.path(), None));
        let source = dir.path().join("in.pdf");
        std::fs::write(&source, b"%PDF").expect("seed");

        let err = sandboxed_copy(
            &session,
            &source,
            &dir.path().join("no-such-dir").join("out.pdf"),
            Duration::from_secs(10),
        )
        .await
        .expect_err("copy into missing dir");
        assert!(matches!(
            err,
            FileOpError::CopyFailed { .. } | FileOpError::CopyDenied { .. }
        ));
    }
}
