//! Placement of compiled PDFs on disk for the `path` output mode.

use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;
use std::time::SystemTime;

use chrono::Local;
use typst_mcp_sandbox::SandboxSession;
use typst_mcp_sandbox::fs_ops::sandboxed_copy;

use crate::error::Result;
use crate::error::ServerError;

const PDF_DIR_NAME: &str = "typst-mcp-pdf";
const COPY_TIMEOUT: Duration = Duration::from_secs(10);
#[cfg(unix)]
const PDF_FILE_MODE: u32 = 0o600;

/// `<tmp>/typst-mcp-pdf`.
pub fn default_pdf_dir() -> PathBuf {
    std::env::temp_dir().join(PDF_DIR_NAME)
}

/// Removes `*.pdf` files in `dir` last modified more than `max_age` ago.
/// A zero age removes every PDF. Returns how many were removed.
pub async fn prune_pdfs(dir: &Path, max_age: Duration) -> usize {
    let cutoff = SystemTime::now()
        .checked_sub(max_age)
        .unwrap_or(SystemTime::UNIX_EPOCH);
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return 0,
        Err(err) => {
            tracing::warn!("PDF cleanup of {} failed: {err}", dir.display());
            return 0;
        }
    };

    let mut removed = 0;
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        if path.extension().is_none_or(|ext| ext != "pdf") {
            continue;
        }
        let expired = match entry.metadata().await.and_then(|meta| meta.modified()) {
            Ok(modified) => max_age.is_zero() || modified < cutoff,
            Err(err) => {
                tracing::warn!("could not stat {}: {err}", path.display());
                false
            }
        };
        if !expired {
            continue;
        }
        match tokio::fs::remove_file(&path).await {
            Ok(()) => removed += 1,
            Err(err) => tracing::warn!("could not delete {}: {err}", path.display()),
        }
    }
    if removed > 0 {
        tracing::debug!("removed {removed} old PDF(s) from {}", dir.display());
    }
    removed
}

fn auto_file_name() -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!(
        "document_{}_{}.pdf",
        Local::now().format("%Y%m%d_%H%M%S"),
        &suffix[..6]
    )
}

/// Writes compiled PDFs where the caller asked, with the sandbox helper
/// deciding whether the destination is writable.
#[derive(Debug, Clone)]
pub struct PdfOutput {
    dir: PathBuf,
    cleanup_age: Duration,
}

impl PdfOutput {
    pub fn new(dir: PathBuf, cleanup_age: Duration) -> Self {
        Self { dir, cleanup_age }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Copies `compiled` to `requested`, or to an auto-named file in the PDF
    /// directory, and restricts it to the owner.
    pub async fn place(
        &self,
        session: &SandboxSession,
        compiled: &Path,
        requested: Option<&str>,
    ) -> Result<PathBuf> {
        let destination = match requested.map(str::trim).filter(|path| !path.is_empty()) {
            Some(path) => std::path::absolute(path)?,
            None => {
                tokio::fs::create_dir_all(&self.dir).await?;
                prune_pdfs(&self.dir, self.cleanup_age).await;
                self.dir.join(auto_file_name())
            }
        };

        let written = sandboxed_copy(session, compiled, &destination, COPY_TIMEOUT)
            .await
            .map_err(|source| ServerError::PdfWriteDenied {
                path: destination.clone(),
                allowed: session.policy().allowed_write_paths.clone(),
                source,
            })?;
        restrict_permissions(&written).await;
        tracing::info!("PDF saved to {}", written.display());
        Ok(written)
    }

    /// Removes every generated PDF. Used on shutdown.
    pub async fn remove_all(&self) -> usize {
        prune_pdfs(&self.dir, Duration::ZERO).await
    }
}

#[cfg(unix)]
async fn restrict_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    let permissions = std::fs::Permissions::from_mode(PDF_FILE_MODE);
    if let Err(err) = tokio::fs::set_permissions(path, permissions).await {
        tracing::warn!("could not restrict permissions of {}: {err}", path.display());
    }
}

#[cfg(not(unix))]
async fn restrict_permissions(_path: &Path) {}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;
    use typst_mcp_sandbox::build_policy;

    #[test]
    fn auto_names_are_timestamped_and_unique() {
        let first = auto_file_name();
        let second = auto_file_name();
        assert!(first.starts_with("document_"));
        assert!(first.ends_with(".pdf"));
        assert_eq!(first.len(), "document_20250120_143022_abc123.pdf".len());
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn zero_age_prunes_only_pdfs() {
        let dir = TempDir::new().expect("tempdir");
        std::fs::write(dir.path().join("a.pdf"), b"%PDF").expect("write");
        std::fs::write(dir.path().join("b.pdf"), b"%PDF").expect("write");
        std::fs::write(dir.path().join("notes.txt"), b"keep").expect("write");

        assert_eq!(prune_pdfs(dir.path(), Duration::ZERO).await, 2);
        assert!(dir.path().join("notes.txt").exists());
    }

    #[tokio::test]
    async fn fresh_pdfs_survive_age_based_pruning() {
        let dir = TempDir::new().expect("tempdir");
        std::fs::write(dir.path().join("fresh.pdf"), b"%PDF").expect("write");
        assert_eq!(prune_pdfs(dir.path(), Duration::from_secs(3600)).await, 0);
        assert!(dir.path().join("fresh.pdf").exists());
    }

    #[tokio::test]
    async fn missing_directory_is_not_an_error() {
        let dir = TempDir::new().expect("tempdir");
        assert_eq!(prune_pdfs(&dir.path().join("absent"), Duration::ZERO).await, 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn placed_pdf_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().expect("tempdir");
        let compiled = dir.path().join("output.pdf");
        std::fs::write(&compiled, b"%PDF-1.7").expect("write");
        let session = SandboxSession::disabled(build_policy(dir.path(), dir.path(), None));
        let output = PdfOutput::new(dir.path().join("pdfs"), Duration::from_secs(3600));

        let placed = output
            .place(&session, &compiled, None)
            .await
            .expect("placed");

        assert!(placed.starts_with(output.dir()));
        assert_eq!(std::fs::read(&placed).expect("read"), b"%PDF-1.7");
        let mode = std::fs::metadata(&placed)
            .expect("metadata")
            .permissions()
            .mode()
            & 0o777;
        assert_eq!(mode, 0o600);
        assert_eq!(output.remove_all().await, 1);
    }

    #[tokio::test]
    async fn failed_copy_lists_allowed_directories() {
        let dir = TempDir::new().expect("tempdir");
        let session = SandboxSession::disabled(build_policy(dir.path(), dir.path(), None));
        let output = PdfOutput::new(dir.path().join("pdfs"), Duration::from_secs(3600));

        let err = output
            .place(&session, &dir.path().join("missing.pdf"), Some("/tmp/out.pdf"))
            .await
            .expect_err("no source");
        match err {
            ServerError::PdfWriteDenied { allowed, .. } => {
                assert!(allowed.contains(&dir.path().to_path_buf()));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
