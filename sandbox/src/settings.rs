//! The configuration shape consumed by `srt --settings <file>`.

use std::path::Path;

use serde::Deserialize;
use serde::Serialize;

use crate::policy::ReadMode;
use crate::policy::SandboxPolicy;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SrtSettings {
    pub filesystem: FilesystemSettings,
    pub network: NetworkSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilesystemSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_read: Option<Vec<String>>,
    pub deny_read: Vec<String>,
    pub allow_write: Vec<String>,
    pub deny_write: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkSettings {
    pub allowed_domains: Vec<String>,
    pub denied_domains: Vec<String>,
}

impl SrtSettings {
    /// Structural translation of `policy`. `artifact_path` becomes a deny-write
    /// rule so the constrained process cannot rewrite its own settings.
    pub fn from_policy(policy: &SandboxPolicy, artifact_path: &Path) -> Self {
        let allow_read = match policy.read_mode {
            ReadMode::Whitelist => Some(policy.allowed_read_paths.clone()),
            ReadMode::Blacklist => None,
        };
        Self {
            filesystem: FilesystemSettings {
                allow_read,
                deny_read: policy.denied_read_paths.clone(),
                allow_write: policy
                    .allowed_write_paths
                    .iter()
                    .map(|p| p.to_string_lossy().into_owned())
                    .collect(),
                deny_write: vec![artifact_path.to_string_lossy().into_owned()],
            },
            network: NetworkSettings {
                allowed_domains: policy.allowed_network_domains.clone(),
                denied_domains: Vec::new(),
            },
        }
    }

    pub fn to_pretty_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
