use std::fs::File;
use std::io;
use std::path::Path;
use std::path::PathBuf;

use super::Hardening;
use super::PlatformCapabilities;

/// BSDs and other unixes: permission bits only, helper optional.
#[derive(Debug)]
pub(crate) struct OtherUnix;

impl PlatformCapabilities for OtherUnix {
    fn name(&self) -> &'static str {
        "unix"
    }

    fn sandbox_mandatory(&self) -> bool {
        false
    }

    fn restrict_to_owner(&self, file: &File) -> io::Result<()> {
        super::set_mode(file, 0o600)
    }

    fn make_read_only(&self, file: &File) -> io::Result<()> {
        super::set_mode(file, 0o400)
    }

    fn harden(&self, _file: &File, _path: &Path) -> Hardening {
        Hardening::none()
    }

    fn unharden(&self, path: &Path, _hardening: Hardening) {
        super::restore_owner_write(path);
    }

    fn tool_cache_dirs(&self) -> Vec<PathBuf> {
        dirs::cache_dir()
            .map(|cache| vec![cache.join("typst")])
            .unwrap_or_default()
    }
}
