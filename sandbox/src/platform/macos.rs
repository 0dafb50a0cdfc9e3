use std::fs::File;
use std::io;
use std::os::fd::AsRawFd;
use std::path::Path;
use std::path::PathBuf;

use super::Hardening;
use super::PlatformCapabilities;
use crate::artifact::ProtectionState;

/// User immutable flag (`uchg`).
const UF_IMMUTABLE: libc::c_uint = 0x0000_0002;

#[derive(Debug)]
pub(crate) struct MacOs;

impl PlatformCapabilities for MacOs {
    fn name(&self) -> &'static str {
        "macos"
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
        let rc = unsafe { libc::fchflags(file.as_raw_fd(), UF_IMMUTABLE) };
        if rc == 0 {
            tracing::info!("uchg flag set on open handle for {}", path.display());
            hardening.state = ProtectionState::ImmutableFlagSet;
            return hardening;
        }

        tracing::debug!(
            "fchflags failed ({}), falling back to chflags",
            io::Error::last_os_error()
        );
        let path_str = path.to_string_lossy();
        if super::run_quiet("chflags", &["uchg", &path_str]) {
            hardening.state = ProtectionState::ImmutableFlagSet;
        } else {
            tracing::warn!("could not set uchg on {}; relying on denyWrite", path.display());
        }
        hardening
    }

    fn unharden(&self, path: &Path, hardening: Hardening) {
        if hardening.state >= ProtectionState::ImmutableFlagSet {
            let path_str = path.to_string_lossy();
            super::run_quiet("chflags", &["nouchg", &path_str]);
        }
        super::restore_owner_write(path);
    }

    fn tool_cache_dirs(&self) -> Vec<PathBuf> {
        let mut dirs_out = Vec::new();
        if let Some(npm) = super::home_relative(&[".npm"]) {
            dirs_out.push(npm);
        }
        // ~/Library/Caches/typst and ~/Library/Application Support/typst
        if let Some(cache) = dirs::cache_dir() {
            dirs_out.push(cache.join("typst"));
        }
        if let Some(data) = dirs::data_dir() {
            dirs_out.push(data.join("typst"));
        }
        dirs_out
    }
}
