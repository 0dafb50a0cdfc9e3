//! Per-platform capabilities used to protect the settings artifact.
//!
//! Each platform gets one implementation of [`PlatformCapabilities`], selected
//! once by [`current`]. Callers never branch on the operating system.

use std::fs::File;
use std::io;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use crate::artifact::ProtectionState;

#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "macos")]
mod macos;
#[cfg(all(unix, not(any(target_os = "linux", target_os = "macos"))))]
mod other_unix;
#[cfg(windows)]
mod windows;

pub trait PlatformCapabilities: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &'static str;

    /// Whether running without an enforcement helper is a fatal startup error.
    fn sandbox_mandatory(&self) -> bool;

    /// Owner-only read/write on the open handle, before any bytes are written.
    fn restrict_to_owner(&self, file: &File) -> io::Result<()>;

    /// Owner read-only on the open handle.
    fn make_read_only(&self, file: &File) -> io::Result<()>;

    /// Best-effort immutability or locking beyond read-only permissions.
    fn harden(&self, file: &File, path: &Path) -> Hardening;

    /// Reverses [`PlatformCapabilities::harden`] and restores owner write
    /// access so the artifact can be deleted.
    fn unharden(&self, path: &Path, hardening: Hardening);

    /// Download caches the sandboxed tools need to write to.
    fn tool_cache_dirs(&self) -> Vec<PathBuf>;
}

/// What [`PlatformCapabilities::harden`] achieved. Holds the lock handle, if
/// any, for as long as the session lives.
#[derive(Debug)]
pub struct Hardening {
    pub state: ProtectionState,
    pub(crate) lock: Option<File>,
}

impl Hardening {
    pub fn none() -> Self {
        Self {
            state: ProtectionState::PermissionLocked,
            lock: None,
        }
    }

    pub fn holds_lock(&self) -> bool {
        self.lock.is_some()
    }
}

pub fn current() -> Arc<dyn PlatformCapabilities> {
    #[cfg(target_os = "linux")]
    let platform: Arc<dyn PlatformCapabilities> = Arc::new(linux::Linux);
    #[cfg(target_os = "macos")]
    let platform: Arc<dyn PlatformCapabilities> = Arc::new(macos::MacOs);
    #[cfg(windows)]
    let platform: Arc<dyn PlatformCapabilities> = Arc::new(windows::Windows);
    #[cfg(all(unix, not(any(target_os = "linux", target_os = "macos"))))]
    let platform: Arc<dyn PlatformCapabilities> = Arc::new(other_unix::OtherUnix);
    platform
}

#[cfg(unix)]
pub(crate) fn set_mode(file: &File, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(std::fs::Permissions::from_mode(mode))
}

#[cfg(unix)]
pub(crate) fn restore_owner_write(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Err(err) = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)) {
        tracing::debug!("could not restore write permission on {}: {err}", path.display());
    }
}

/// Runs a short helper command such as `chattr`, returning whether it succeeded.
pub(crate) fn run_quiet(program: &str, args: &[&str]) -> bool {
    match std::process::Command::new(program).args(args).output() {
        Ok(output) if output.status.success() => true,
        Ok(output) => {
            tracing::debug!(
                "{program} {args:?} exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
            false
        }
        Err(err) => {
            tracing::debug!("{program} unavailable: {err}");
            false
        }
    }
}

#[cfg(any(target_os = "linux", target_os = "macos"))]
pub(crate) fn home_relative(parts: &[&str]) -> Option<PathBuf> {
    dirs::home_dir().map(|home| parts.iter().fold(home, |acc, part| acc.join(part)))
}
