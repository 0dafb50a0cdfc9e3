use std::io;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use std::time::Instant;

use tokio::io::AsyncRead;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::task::JoinHandle;

use crate::error::Result;
use crate::error::SandboxError;

/// Exit code reported for a command killed by its timeout.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// Pipes can stay open after a kill when grandchildren inherited them.
const IO_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
    pub timed_out: bool,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == 0
    }
}

/// Runs `argv` to completion or until `timeout` fires, in which case the
/// child is killed and `timed_out` is set.
pub async fn run_command(argv: &[String], cwd: Option<&Path>, timeout: Duration) -> Result<ExecOutput> {
    let (program, args) = argv.split_first().ok_or(SandboxError::EmptyCommand)?;

    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(cwd) = cwd {
        command.current_dir(cwd);
    }

    let start = Instant::now();
    let mut child = command.spawn()?;

    let stdout_reader = child
        .stdout
        .take()
        .ok_or_else(|| io::Error::other("stdout pipe was unexpectedly not available"))?;
    let stderr_reader = child
        .stderr
        .take()
        .ok_or_else(|| io::Error::other("stderr pipe was unexpectedly not available"))?;
    let mut stdout_handle = tokio::spawn(read_all(stdout_reader));
    let mut stderr_handle = tokio::spawn(read_all(stderr_reader));

    let (exit_code, timed_out) = match tokio::time::timeout(timeout, child.wait()).await {
        Ok(status) => (status?.code().unwrap_or(-1), false),
        Err(_) => {
            tracing::warn!("{program} timed out after {timeout:?}; killing it");
            if let Err(err) = child.start_kill() {
                tracing::debug!("kill after timeout failed: {err}");
            }
            let _ = child.wait().await;
            (TIMEOUT_EXIT_CODE, true)
        }
    };

    let stdout = drain(&mut stdout_handle).await?;
    let stderr = drain(&mut stderr_handle).await?;

    Ok(ExecOutput {
        exit_code,
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
        duration: start.elapsed(),
        timed_out,
    })
}

async fn read_all<R: AsyncRead + Unpin + Send + 'static>(mut reader: R) -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf).await?;
    Ok(buf)
}

async fn drain(handle: &mut JoinHandle<io::Result<Vec<u8>>>) -> io::Result<Vec<u8>> {
    match tokio::time::timeout(IO_DRAIN_TIMEOUT, &mut *handle).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_err)) => Err(io::Error::other(join_err)),
        Err(_elapsed) => {
            handle.abort();
            Ok(Vec::new())
        }
    }
}

/// Heuristic for "the helper refused this", based on the diagnostics the
/// helper and the kernel produce.
pub fn is_likely_sandbox_denied(output: &ExecOutput) -> bool {
    const SANDBOX_DENIED_KEYWORDS: [&str; 6] = [
        "operation not permitted",
        "permission denied",
        "read-only file system",
        "sandbox",
        "denied by policy",
        "access is denied",
    ];

    if output.success() || output.timed_out {
        return false;
    }
    let stderr = output.stderr.to_lowercase();
    SANDBOX_DENIED_KEYWORDS
        .iter()
        .any(|needle| stderr.contains(needle))
}
