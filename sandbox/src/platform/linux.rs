use std::fs::File;
use std::io;
use std::os::fd::AsRawFd;
use std::path::Path;
use std::path::PathBuf;

use super::Hardening;
use super::PlatformCapabilities;
use crate::artifact::ProtectionState;

#[derive(Debug)]
pub(crate) struct Linux;

impl PlatformCapabilities for Linux {
    fn name(&self) -> &'static str {
        "linux"
    }

    fn sandbox_mandatory(&self) -> bool {
        true
    }

    fn restrict_to_owner(&self, file: &File) -> io::Result<()> {
        super::set_mode(file, 0o600)
    }

    fn make_read_only(&self, file: &File) -> io::Result<()> {
        super::set_mode(file, 0o400)
    }

    fn harden(&self, file: &File, path: &Path) -> Hardening {
        let mut hardening = Hardening::none();

        // The lock lives on a duplicated handle so it survives the writer
        // handle being closed.
        match file.try_clone() {
            Ok(lock) => {
                let rc = unsafe { libc::flock(lock.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
                if rc == 0 {
                    tracing::info!("advisory lock held on {}", path.display());
                    hardening.lock = Some(lock);
                } else {
                    tracing::debug!("flock failed: {}", io::Error::last_os_error());
                }
            }
            Err(err) => tracing::debug!("could not duplicate artifact handle: {err}"),
        }

        let path_str = path.to_string_lossy();
        if super::run_quiet("chattr", &["+i", &path_str]) {
            tracing::info!("immutable flag set on {}", path.display());
            hardening.state = hardening.state.max(ProtectionState::ImmutableFlagSet);
        } else {
            tracing::info!(
                "chattr +i unavailable (needs CAP_LINUX_IMMUTABLE); relying on denyWrite and the advisory lock"
            );
        }
        if hardening.lock.is_some() {
            hardening.state = hardening.state.max(ProtectionState::LockHeld);
        }
        hardening
    }

    fn unharden(&self, path: &Path, hardening: Hardening) {
        if hardening.state >= ProtectionState::ImmutableFlagSet {
            let path_str = path.to_string_lossy();
            super::run_quiet("chattr", &["-i", &path_str]);
        }
        if let Some(lock) = hardening.lock {
            unsafe { libc::flock(lock.as_raw_fd(), libc::LOCK_UN) };
        }
        super::restore_owner_write(path);
    }

    fn tool_cache_dirs(&self) -> Vec<PathBuf> {
        let mut dirs_out = Vec::new();
        if let Some(npm) = super::home_relative(&[".npm"]) {
            dirs_out.push(npm);
        }
        if let Some(cache) = dirs::cache_dir() {
            dirs_out.push(cache.join("typst"));
        }
        if let Some(data) = dirs::data_dir() {
            dirs_out.push(data.join("typst"));
        }
        dirs_out
    }
}
