use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use typst_mcp_registry::RegistryError;

pub type Result<T> = std::result::Result<T, DocsError>;

#[derive(Debug, Error)]
pub enum DocsError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("building documentation for {package} timed out after {:.1}s", elapsed.as_secs_f64())]
    Timeout { package: String, elapsed: Duration },

    #[error("package cache at {path}: {source}")]
    Cache {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode cached document: {0}")]
    Encode(#[from] serde_json::Error),
}

impl DocsError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, DocsError::Registry(RegistryError::NotFound { .. }))
    }
}
