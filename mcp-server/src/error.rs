use std::path::PathBuf;
use std::time::Duration;

use rmcp::ErrorData as McpError;
use rmcp::model::ErrorCode;
use serde_json::json;
use thiserror::Error;
use typst_mcp_package_docs::DocsError;
use typst_mcp_registry::RegistryError;
use typst_mcp_sandbox::FileOpError;
use typst_mcp_sandbox::SandboxError;

/// Application error codes, next to the JSON-RPC standard ones.
pub mod codes {
    pub const INPUT_TOO_LARGE: i32 = -32000;
    pub const OPERATION_FAILED: i32 = -32001;
    pub const RESOURCE_NOT_FOUND: i32 = -32002;
    pub const TIMEOUT: i32 = -32003;
}

pub type Result<T> = std::result::Result<T, ServerError>;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("{what} too large: {len} bytes (max {max} bytes)")]
    InputTooLarge {
        what: &'static str,
        len: usize,
        max: usize,
    },

    /// The converter's own diagnostics, verbatim.
    #[error("Failed to convert LaTeX to Typst. Pandoc error: {stderr}")]
    ConvertFailed { stderr: String },

    /// The compiler's own diagnostics, verbatim.
    #[error("Typst compilation failed: {stderr}")]
    CompileFailed { stderr: String },

    #[error("{what} timed out after {}s", after.as_secs())]
    Timeout { what: &'static str, after: Duration },

    #[error("No pages were generated by the Typst compiler")]
    NoPages,

    #[error("Failed to process page images: {0}")]
    Image(String),

    #[error("PDF is {size} bytes; the limit is {max} bytes")]
    PdfTooLarge { size: u64, max: u64 },

    #[error("Could not write PDF to {}: {source}. Allowed write directories: {}", path.display(), allowed.iter().map(|p| p.display().to_string()).collect::<Vec<_>>().join(", "))]
    PdfWriteDenied {
        path: PathBuf,
        allowed: Vec<PathBuf>,
        #[source]
        source: FileOpError,
    },

    #[error("{0}")]
    NotFound(String),

    #[error(
        "Documentation is still building. This typically takes 1-2 minutes on first run. \
         Other tools are available immediately; please retry shortly."
    )]
    DocsStillBuilding,

    #[error("Documentation is not available: {0}")]
    DocsUnavailable(String),

    #[error(transparent)]
    Docs(#[from] DocsError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    FileOp(#[from] FileOpError),

    #[error(transparent)]
    Sandbox(#[from] SandboxError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl ServerError {
    pub fn code(&self) -> i32 {
        match self {
            ServerError::InputTooLarge { .. } | ServerError::PdfTooLarge { .. } => {
                codes::INPUT_TOO_LARGE
            }
            ServerError::Timeout { .. }
            | ServerError::Sandbox(SandboxError::Timeout(_))
            | ServerError::Docs(DocsError::Timeout { .. })
            | ServerError::Registry(RegistryError::Timeout { .. }) => codes::TIMEOUT,
            ServerError::NotFound(_)
            | ServerError::Registry(RegistryError::NotFound { .. }) => codes::RESOURCE_NOT_FOUND,
            ServerError::Docs(err) if err.is_not_found() => codes::RESOURCE_NOT_FOUND,
            ServerError::Registry(RegistryError::Validation(_))
            | ServerError::Docs(DocsError::Registry(RegistryError::Validation(_))) => {
                ErrorCode::INVALID_PARAMS.0
            }
            _ => codes::OPERATION_FAILED,
        }
    }

    fn data(&self) -> Option<serde_json::Value> {
        match self {
            ServerError::ConvertFailed { stderr } | ServerError::CompileFailed { stderr } => {
                Some(json!({ "stderr": stderr }))
            }
            ServerError::DocsStillBuilding => Some(json!({ "retryable": true })),
            _ => None,
        }
    }
}

impl From<ServerError> for McpError {
    fn from(err: ServerError) -> Self {
        McpError::new(ErrorCode(err.code()), err.to_string(), err.data())
    }
}
