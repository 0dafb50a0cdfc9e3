//! Filesystem and network rules for one server process.
//!
//! A [`SandboxPolicy`] is built once at startup from a fixed baseline plus
//! command-line overrides and is immutable afterwards. Environment variables
//! may only add read restrictions; anything that would widen the policy is
//! recognised and rejected.

use std::path::Path;
use std::path::PathBuf;

use serde::Serialize;

/// Read locations that stay denied in every mode. Credential stores, key
/// material and container control sockets.
pub const ALWAYS_DENIED_PATHS: &[&str] = &[
    "~/.ssh",
    "~/.aws",
    "~/.azure",
    "~/.config/gcloud",
    "~/.config/gh",
    "~/.gnupg",
    "~/.kube",
    "~/.docker",
    "~/.netrc",
    "~/.npmrc",
    "~/.pypirc",
    "~/.git-credentials",
    ".env",
    ".git/config",
    "/var/run/docker.sock",
];

/// Hosts the compiler may reach to download packages.
pub const ALLOWED_NETWORK_DOMAINS: &[&str] = &[
    "packages.typst.org",
    "github.com",
    "*.github.com",
    "*.githubusercontent.com",
];

pub const DENY_READ_ENV_VAR: &str = "TYPST_MCP_DENY_READ";

/// Environment variables that used to widen the policy. They are detected and
/// ignored.
pub const REJECTED_ENV_VARS: &[(&str, &str)] = &[
    ("TYPST_MCP_ALLOW_WRITE", "write-path expansion"),
    ("TYPST_MCP_ALLOW_DOMAINS", "network-domain expansion"),
    ("TYPST_MCP_ALLOW_READ", "read whitelist (use --read-allow-only)"),
    ("TYPST_MCP_DISABLE_SANDBOX", "sandbox disable (use --disable-sandbox)"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadMode {
    /// Reads are open except for the denied paths.
    Blacklist,
    /// Reads are closed except for the allowed paths.
    Whitelist,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SandboxPolicy {
    pub read_mode: ReadMode,
    pub always_denied_paths: Vec<String>,
    pub denied_read_paths: Vec<String>,
    /// Only populated in [`ReadMode::Whitelist`].
    pub allowed_read_paths: Vec<String>,
    pub allowed_write_paths: Vec<PathBuf>,
    pub allowed_network_domains: Vec<String>,
}

/// Restrictions read from the environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvOverrides {
    pub deny_read: Vec<String>,
    /// Names of widening variables that were set and ignored.
    pub rejected: Vec<&'static str>,
}

impl EnvOverrides {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let deny_read = lookup(DENY_READ_ENV_VAR)
            .map(|value| split_path_list(&value))
            .unwrap_or_default();

        let mut rejected = Vec::new();
        for (name, what) in REJECTED_ENV_VARS {
            if lookup(name).is_some_and(|value| !value.trim().is_empty()) {
                tracing::warn!(
                    "\n============================================================\n\
                     IGNORING {name}: {what} is not configurable through the\n\
                     environment. Environment variables can be planted by other\n\
                     software; only command-line flags may change this setting.\n\
                     ============================================================"
                );
                rejected.push(*name);
            }
        }

        Self {
            deny_read,
            rejected,
        }
    }
}

/// Splits a comma separated flag or variable value, dropping empty entries.
pub fn split_path_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// Builds the policy for a session.
///
/// `whitelist_paths` selects [`ReadMode::Whitelist`]; `None` keeps the default
/// blacklist posture.
pub fn build_policy(
    scratch_dir: &Path,
    cwd: &Path,
    whitelist_paths: Option<Vec<String>>,
) -> SandboxPolicy {
    let mut builder = SandboxPolicyBuilder::new(scratch_dir, cwd);
    if let Some(paths) = whitelist_paths {
        builder = builder.read_allow_only(paths);
    }
    builder.build()
}

#[derive(Debug, Clone)]
pub struct SandboxPolicyBuilder {
    scratch_dir: PathBuf,
    cwd: PathBuf,
    temp_root: PathBuf,
    home: Option<PathBuf>,
    whitelist: Option<Vec<String>>,
    extra_deny: Vec<String>,
    tool_cache_dirs: Vec<PathBuf>,
}

impl SandboxPolicyBuilder {
    pub fn new(scratch_dir: &Path, cwd: &Path) -> Self {
        Self {
            scratch_dir: scratch_dir.to_path_buf(),
            cwd: cwd.to_path_buf(),
            temp_root: std::env::temp_dir(),
            home: dirs::home_dir(),
            whitelist: None,
            extra_deny: Vec::new(),
            tool_cache_dirs: Vec::new(),
        }
    }

    pub fn read_allow_only(mut self, paths: Vec<String>) -> Self {
        self.whitelist = Some(paths);
        self
    }

    /// Additional read denials from `--deny-read`.
    pub fn deny_read(mut self, paths: Vec<String>) -> Self {
        self.extra_deny.extend(paths);
        self
    }

    pub fn env_overrides(mut self, overrides: &EnvOverrides) -> Self {
        self.extra_deny.extend(overrides.deny_read.iter().cloned());
        self
    }

    pub fn tool_cache_dirs(mut self, dirs: Vec<PathBuf>) -> Self {
        self.tool_cache_dirs = dirs;
        self
    }

    pub fn temp_root(mut self, temp_root: &Path) -> Self {
        self.temp_root = temp_root.to_path_buf();
        self
    }

    pub fn home_dir(mut self, home: Option<PathBuf>) -> Self {
        self.home = home;
        self
    }

    pub fn build(self) -> SandboxPolicy {
        let home = self.home.as_deref();
        let always_denied: Vec<String> = ALWAYS_DENIED_PATHS
            .iter()
            .map(|p| expand_home(p, home))
            .collect();

        let (read_mode, denied_read_paths, allowed_read_paths) = match self.whitelist {
            Some(paths) => {
                tracing::info!(
                    "read whitelist mode: allowing {} paths, still denying {} sensitive paths",
                    paths.len(),
                    always_denied.len()
                );
                if !self.extra_deny.is_empty() {
                    tracing::debug!("extra deny-read paths are redundant in whitelist mode");
                }
                let allowed = paths.iter().map(|p| expand_home(p, home)).collect();
                (ReadMode::Whitelist, always_denied.clone(), allowed)
            }
            None => {
                let mut denied = always_denied.clone();
                for path in &self.extra_deny {
                    let expanded = expand_home(path, home);
                    if !denied.contains(&expanded) {
                        denied.push(expanded);
                    }
                }
                (ReadMode::Blacklist, denied, Vec::new())
            }
        };

        let mut allowed_write_paths = Vec::new();
        for path in [self.cwd, self.temp_root, self.scratch_dir]
            .into_iter()
            .chain(self.tool_cache_dirs)
        {
            if !allowed_write_paths.contains(&path) {
                allowed_write_paths.push(path);
            }
        }

        SandboxPolicy {
            read_mode,
            always_denied_paths: always_denied,
            denied_read_paths,
            allowed_read_paths,
            allowed_write_paths,
            allowed_network_domains: ALLOWED_NETWORK_DOMAINS
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }
}

impl SandboxPolicy {
    pub fn builder(scratch_dir: &Path, cwd: &Path) -> SandboxPolicyBuilder {
        SandboxPolicyBuilder::new(scratch_dir, cwd)
    }

    /// Returns the policy as it must be handed to the helper: every always-denied
    /// path is denied, and no allowed read path reaches into one of them.
    pub fn enforced(&self) -> SandboxPolicy {
        let mut policy = self.clone();

        for denied in &self.always_denied_paths {
            if !policy.denied_read_paths.contains(denied) {
                policy.denied_read_paths.push(denied.clone());
            }
        }

        policy.allowed_read_paths.retain(|allowed| {
            let conflict = self
                .always_denied_paths
                .iter()
                .find(|denied| Path::new(allowed).starts_with(Path::new(denied)));
            if let Some(denied) = conflict {
                tracing::warn!("dropping allowed read path {allowed}: it is inside {denied}");
                false
            } else {
                true
            }
        });

        policy
    }
}

fn expand_home(path: &str, home: Option<&Path>) -> String {
    match (path.strip_prefix("~/"), home) {
        (Some(rest), Some(home)) => home.join(rest).to_string_lossy().into_owned(),
        _ if path == "~" => home
            .map(|h| h.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string()),
        _ => path.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn builder() -> SandboxPolicyBuilder {
        SandboxPolicy::builder(Path::new("/tmp/scratch"), Path::new("/work"))
            .temp_root(Path::new("/tmp"))
            .home_dir(Some(PathBuf::from("/home/u")))
    }

    #[test]
    fn blacklist_is_default_and_denies_baseline() {
        let policy = builder().build();
        assert_eq!(policy.read_mode, ReadMode::Blacklist);
        assert!(policy.allowed_read_paths.is_empty());
        assert!(
            policy
                .denied_read_paths
                .contains(&"/home/u/.ssh".to_string())
        );
        assert_eq!(policy.denied_read_paths, policy.always_denied_paths);
    }

    #[test]
    fn whitelist_keeps_always_denied_as_explicit_deny() {
        let policy = builder()
            .read_allow_only(vec!["~/docs".to_string(), "/opt/fonts".to_string()])
            .build();
        assert_eq!(policy.read_mode, ReadMode::Whitelist);
        assert_eq!(
            policy.allowed_read_paths,
            vec!["/home/u/docs".to_string(), "/opt/fonts".to_string()]
        );
        assert_eq!(policy.denied_read_paths, policy.always_denied_paths);
    }

    #[test]
    fn extra_deny_paths_extend_blacklist() {
        let overrides = EnvOverrides::from_lookup(|key| {
            (key == DENY_READ_ENV_VAR).then(|| "~/secrets, /srv/private ,".to_string())
        });
        let policy = builder()
            .deny_read(vec!["/mnt/backup".to_string()])
            .env_overrides(&overrides)
            .build();
        let tail: Vec<&str> = policy
            .denied_read_paths
            .iter()
            .skip(ALWAYS_DENIED_PATHS.len())
            .map(String::as_str)
            .collect();
        assert_eq!(tail, vec!["/mnt/backup", "/home/u/secrets", "/srv/private"]);
    }

    #[test]
    fn widening_env_vars_are_rejected() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("TYPST_MCP_ALLOW_WRITE", "/"),
            ("TYPST_MCP_ALLOW_DOMAINS", "evil.example"),
            ("TYPST_MCP_DISABLE_SANDBOX", "1"),
        ]);
        let overrides = EnvOverrides::from_lookup(|key| env.get(key).map(ToString::to_string));
        assert_eq!(
            overrides.rejected,
            vec![
                "TYPST_MCP_ALLOW_WRITE",
                "TYPST_MCP_ALLOW_DOMAINS",
                "TYPST_MCP_DISABLE_SANDBOX"
            ]
        );

        let policy = builder().env_overrides(&overrides).build();
        assert!(!policy.allowed_write_paths.contains(&PathBuf::from("/")));
        assert!(
            !policy
                .allowed_network_domains
                .contains(&"evil.example".to_string())
        );
    }

    #[test]
    fn write_paths_are_whitelist_of_session_locations() {
        let policy = builder()
            .tool_cache_dirs(vec![PathBuf::from("/home/u/.npm"), PathBuf::from("/tmp")])
            .build();
        assert_eq!(
            policy.allowed_write_paths,
            vec![
                PathBuf::from("/work"),
                PathBuf::from("/tmp"),
                PathBuf::from("/tmp/scratch"),
                PathBuf::from("/home/u/.npm"),
            ]
        );
    }

    #[test]
    fn enforced_drops_allowed_paths_inside_always_denied() {
        let policy = builder()
            .read_allow_only(vec![
                "~/.ssh".to_string(),
                "~/.aws/credentials".to_string(),
                "~/projects".to_string(),
            ])
            .build();
        let enforced = policy.enforced();
        assert_eq!(
            enforced.allowed_read_paths,
            vec!["/home/u/projects".to_string()]
        );
        for denied in &policy.always_denied_paths {
            assert!(enforced.denied_read_paths.contains(denied));
        }
    }

    #[test]
    fn build_policy_selects_mode_from_whitelist_presence() {
        let scratch = Path::new("/tmp/s");
        let cwd = Path::new("/w");
        assert_eq!(build_policy(scratch, cwd, None).read_mode, ReadMode::Blacklist);
        assert_eq!(
            build_policy(scratch, cwd, Some(vec!["/w".to_string()])).read_mode,
            ReadMode::Whitelist
        );
    }
}
