#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use pretty_assertions::assert_eq;
use tempfile::TempDir;
use typst_mcp_sandbox::FileOpError;
use typst_mcp_sandbox::Helper;
use typst_mcp_sandbox::SandboxSession;
use typst_mcp_sandbox::build_policy;
use typst_mcp_sandbox::fs_ops::sandboxed_copy;
use typst_mcp_sandbox::platform;

/// Stand-in for `srt`: checks the settings argument then runs the command.
const PASSTHROUGH_HELPER: &str = r#"#!/bin/sh
[ "$1" = "--settings" ] || exit 90
settings="$2"
shift 2
[ "$1" = "--" ] || exit 91
shift
[ -r "$settings" ] || exit 92
exec "$@"
"#;

/// Stand-in for `srt` that refuses everything.
const DENYING_HELPER: &str = r#"#!/bin/sh
echo "sandbox: write denied by policy: Operation not permitted" >&2
exit 1
"#;

fn write_helper(dir: &Path, name: &str, script: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, script).expect("write helper");
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).expect("chmod helper");
    path
}

async fn session_with(dir: &TempDir, script: &str) -> SandboxSession {
    let bin_dir = dir.path().join("bin");
    std::fs::create_dir(&bin_dir).expect("bin dir");
    let helper = write_helper(&bin_dir, "srt", script);
    SandboxSession::with_helper(
        build_policy(dir.path(), dir.path(), None),
        Helper::installed(helper.to_string_lossy().into_owned()),
        dir.path(),
        platform::current(),
    )
    .await
    .expect("session")
}

#[tokio::test]
async fn wrapped_command_runs_through_helper() {
    let dir = TempDir::new().expect("tempdir");
    let session = session_with(&dir, PASSTHROUGH_HELPER).await;

    let output = session
        .run(
            vec!["sh".to_string(), "-c".to_string(), "echo ok".to_string()],
            None,
            Duration::from_secs(10),
        )
        .await
        .expect("run");

    assert_eq!(output.exit_code, 0);
    assert_eq!(output.stdout, "ok\n");
    session.cleanup();
}

#[tokio::test]
async fn copy_through_passthrough_helper_succeeds() {
    let dir = TempDir::new().expect("tempdir");
    let session = session_with(&dir, PASSTHROUGH_HELPER).await;
    let source = dir.path().join("a.pdf");
    std::fs::write(&source, b"%PDF-1.7").expect("seed");
    let destination = dir.path().join("b.pdf");

    sandboxed_copy(&session, &source, &destination, Duration::from_secs(10))
        .await
        .expect("copy");

    assert_eq!(std::fs::read(&destination).expect("read"), b"%PDF-1.7");
    session.cleanup();
}

#[tokio::test]
async fn copy_refused_by_helper_is_copy_denied() {
    let dir = TempDir::new().expect("tempdir");
    let session = session_with(&dir, DENYING_HELPER).await;
    let source = dir.path().join("a.pdf");
    std::fs::write(&source, b"%PDF").expect("seed");
    let destination = dir.path().join("b.pdf");

    let err = sandboxed_copy(&session, &source, &destination, Duration::from_secs(10))
        .await
        .expect_err("helper denies");

    assert!(matches!(err, FileOpError::CopyDenied { .. }), "{err:?}");
    assert!(!destination.exists());
    session.cleanup();
}

#[tokio::test]
async fn helper_reporting_success_without_output_is_an_error() {
    let dir = TempDir::new().expect("tempdir");
    let session = session_with(&dir, "#!/bin/sh\nexit 0\n").await;
    let source = dir.path().join("a.pdf");
    std::fs::write(&source, b"%PDF").expect("seed");
    let destination = dir.path().join("b.pdf");

    let err = sandboxed_copy(&session, &source, &destination, Duration::from_secs(10))
        .await
        .expect_err("nothing was copied");

    assert!(matches!(err, FileOpError::DestinationNotCreated(_)));
    session.cleanup();
}

#[tokio::test]
async fn helper_leaving_existing_destination_untouched_is_an_error() {
    let dir = TempDir::new().expect("tempdir");
    let session = session_with(&dir, "#!/bin/sh\nexit 0\n").await;
    let source = dir.path().join("a.pdf");
    std::fs::write(&source, b"%PDF fresh").expect("seed");
    let destination = dir.path().join("b.pdf");
    std::fs::write(&destination, b"%PDF stale").expect("seed stale");

    let err = sandboxed_copy(&session, &source, &destination, Duration::from_secs(10))
        .await
        .expect_err("stale destination");

    assert!(matches!(err, FileOpError::DestinationNotUpdated(_)), "{err:?}");
    assert_eq!(std::fs::read(&destination).expect("read"), b"%PDF stale");
    session.cleanup();
}

#[tokio::test]
async fn copy_over_existing_destination_replaces_it() {
    let dir = TempDir::new().expect("tempdir");
    let session = session_with(&dir, PASSTHROUGH_HELPER).await;
    let source = dir.path().join("a.pdf");
    std::fs::write(&source, b"%PDF fresh").expect("seed");
    let destination = dir.path().join("b.pdf");
    std::fs::write(&destination, b"%PDF stale").expect("seed stale");

    sandboxed_copy(&session, &source, &destination, Duration::from_secs(10))
        .await
        .expect("copy");

    assert_eq!(std::fs::read(&destination).expect("read"), b"%PDF fresh");
    session.cleanup();
}
