use std::path::PathBuf;

use clap::Parser;
use typst_mcp_sandbox::policy::split_path_list;

/// Command-line flags. Security-relevant settings are accepted only here,
/// never from the environment.
#[derive(Debug, Clone, Default, Parser)]
#[command(
    name = "typst-mcp-server",
    version,
    about = "MCP server for Typst conversion, rendering and package documentation"
)]
pub struct Cli {
    /// Switch to whitelist read mode: only these comma-separated paths are
    /// readable by sandboxed commands.
    #[arg(long, value_name = "PATHS")]
    pub read_allow_only: Option<String>,

    /// Additional comma-separated paths sandboxed commands may not read.
    #[arg(long, value_name = "PATHS")]
    pub deny_read: Option<String>,

    /// Run external commands without the sandbox helper. Debugging only.
    #[arg(long)]
    pub disable_sandbox: bool,

    /// Restrict the Typst compiler's project root to the session scratch
    /// directory.
    #[arg(long)]
    pub strict: bool,

    /// TOML file with timeouts and limits.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Parent directory for the per-session scratch directory.
    #[arg(long, value_name = "DIR")]
    pub scratch_dir: Option<PathBuf>,
}

impl Cli {
    pub fn read_allow_only_paths(&self) -> Option<Vec<String>> {
        self.read_allow_only.as_deref().map(split_path_list)
    }

    pub fn deny_read_paths(&self) -> Vec<String> {
        self.deny_read
            .as_deref()
            .map(split_path_list)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn path_lists_are_comma_separated() {
        let cli = Cli::parse_from([
            "typst-mcp-server",
            "--read-allow-only",
            "/work, /usr/share/fonts",
            "--deny-read",
            "~/secrets",
            "--strict",
        ]);
        assert_eq!(
            cli.read_allow_only_paths(),
            Some(vec!["/work".to_string(), "/usr/share/fonts".to_string()])
        );
        assert_eq!(cli.deny_read_paths(), vec!["~/secrets".to_string()]);
        assert!(cli.strict);
        assert!(!cli.disable_sandbox);
    }

    #[test]
    fn blacklist_mode_is_the_default() {
        let cli = Cli::parse_from(["typst-mcp-server"]);
        assert_eq!(cli.read_allow_only_paths(), None);
        assert!(cli.deny_read_paths().is_empty());
    }
}
