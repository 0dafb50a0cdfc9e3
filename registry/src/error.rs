use std::time::Duration;

use thiserror::Error;

use crate::identifier::ValidationError;
use crate::url_guard::BlockReason;

pub type Result<T> = std::result::Result<T, RegistryError>;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("not found in registry: {what}")]
    NotFound { what: String },

    #[error("request to {url} timed out after {elapsed:?}")]
    Timeout { url: String, elapsed: Duration },

    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("request to {url} rejected: {rule}")]
    SecurityRejected { url: String, rule: BlockReason },

    #[error("response from {url} exceeds the {limit} byte limit")]
    SizeExceeded {
        url: String,
        limit: u64,
        actual: Option<u64>,
    },

    #[error("could not decode response from {url}: {message}")]
    Decode { url: String, message: String },
}

impl RegistryError {
    /// Errors that must abort the operation instead of degrading to
    /// "absent".
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RegistryError::Validation(_) | RegistryError::SecurityRejected { .. }
        )
    }
}
