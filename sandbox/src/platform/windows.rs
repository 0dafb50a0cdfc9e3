use std::fs::File;
use std::io;
use std::path::Path;
use std::path::PathBuf;

use super::Hardening;
use super::PlatformCapabilities;
use crate::artifact::ProtectionState;

#[derive(Debug)]
pub(crate) struct Windows;

fn current_user() -> Option<String> {
    std::env::var("USERNAME").ok().filter(|u| !u.is_empty())
}

impl PlatformCapabilities for Windows {
    fn name(&self) -> &'static str {
        "windows"
    }

    fn sandbox_mandatory(&self) -> bool {
        false
    }

    // Temp files are created under the user's profile, which is already
    // private; ACLs are tightened in `harden`.
    fn restrict_to_owner(&self, _file: &File) -> io::Result<()> {
        Ok(())
    }

    fn make_read_only(&self, file: &File) -> io::Result<()> {
        let mut permissions = file.metadata()?.permissions();
        permissions.set_readonly(true);
        file.set_permissions(permissions)
    }

    fn harden(&self, _file: &File, path: &Path) -> Hardening {
        let mut hardening = Hardening::none();
        let Some(user) = current_user() else {
            tracing::warn!("USERNAME is not set; skipping ACL hardening");
            return hardening;
        };
        let path_str = path.to_string_lossy();
        let grant = format!("{user}:(R)");
        let deny = format!("{user}:(DE)");
        if super::run_quiet(
            "icacls",
            &[&path_str, "/inheritance:r", "/grant:r", &grant, "/deny", &deny],
        ) {
            tracing::info!("ACL set on {}: {user} read-only, delete denied", path.display());
            hardening.state = ProtectionState::ImmutableFlagSet;
        } else {
            tracing::warn!("failed to set ACLs on {}; file may be modifiable", path.display());
        }
        hardening
    }

    fn unharden(&self, path: &Path, hardening: Hardening) {
        let path_str = path.to_string_lossy();
        if hardening.state >= ProtectionState::ImmutableFlagSet {
            super::run_quiet("icacls", &[&path_str, "/reset"]);
        }
        if let Ok(metadata) = std::fs::metadata(path) {
            let mut permissions = metadata.permissions();
            #[allow(clippy::permissions_set_readonly_false)]
            permissions.set_readonly(false);
            if let Err(err) = std::fs::set_permissions(path, permissions) {
                tracing::debug!("could not clear read-only on {}: {err}", path.display());
            }
        }
    }

    fn tool_cache_dirs(&self) -> Vec<PathBuf> {
        let mut dirs_out = Vec::new();
        if let Some(local) = dirs::data_local_dir() {
            dirs_out.push(local.join("npm-cache"));
            dirs_out.push(local.join("typst"));
        }
        if let Some(roaming) = dirs::data_dir() {
            dirs_out.push(roaming.join("npm"));
        }
        dirs_out
    }
}
